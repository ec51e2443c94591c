use std::sync::Arc;

use tourbook_core::payment::{NewPayment, Payment, PaymentFilter, PaymentUpdate};
use tourbook_core::repository::PaymentRepository;
use tourbook_core::{CoreError, CoreResult};

/// Records payments against bookings.
///
/// No provider is called here; amounts and states arrive already settled
/// and the repository applies their effect on the booking.
pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentRepository>,
    default_currency: String,
}

impl PaymentOrchestrator {
    pub fn new(payments: Arc<dyn PaymentRepository>, default_currency: impl Into<String>) -> Self {
        Self { payments, default_currency: default_currency.into() }
    }

    pub async fn list(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>> {
        self.payments.list_payments(filter).await
    }

    pub async fn get(&self, id: i64) -> CoreResult<Payment> {
        self.payments
            .get_payment(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Payment {}", id)))
    }

    pub async fn record(&self, mut payment: NewPayment) -> CoreResult<Payment> {
        payment.validate()?;
        let currency = payment
            .currency
            .take()
            .unwrap_or_else(|| self.default_currency.clone())
            .to_ascii_uppercase();
        payment.currency = Some(currency);
        self.payments.record_payment(&payment).await
    }

    pub async fn update(&self, id: i64, update: PaymentUpdate) -> CoreResult<Payment> {
        self.payments.update_payment(id, &update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{BookingManager, BookingPolicy};
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;
    use tourbook_core::availability::{NewSlot, SlotTemplate};
    use tourbook_core::booking::{Booking, BookingRequest, BookingStatus, PaymentStatus};
    use tourbook_core::catalog::NewTour;
    use tourbook_core::payment::PaymentState;
    use tourbook_core::repository::{AvailabilityRepository, TourRepository};
    use tourbook_store::MemoryStore;

    async fn booked(store: &Arc<MemoryStore>) -> Booking {
        let tour = store
            .create_tour(&NewTour {
                summary: "Sunset sail".into(),
                description: "Catamaran cruise".into(),
                activity_type: "boat".into(),
                activity_type_label: None,
                is_online: false,
                booked_in_24_hours: 3,
                is_reserve_now_pay_later: false,
                vendor_id: None,
                category_ids: Vec::new(),
            })
            .await
            .unwrap();
        let slot = store
            .create_slot(&NewSlot {
                tour_id: tour.id,
                date: NaiveDate::from_ymd_opt(2025, 6, 21).unwrap(),
                schedule: SlotTemplate {
                    start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                    end_time: None,
                    max_spots: 8,
                    price_adult: dec!(60),
                    price_child: Some(dec!(30)),
                    is_available: true,
                },
            })
            .await
            .unwrap();
        BookingManager::new(store.clone(), store.clone(), BookingPolicy::default())
            .create(
                None,
                BookingRequest {
                    tour_id: tour.id,
                    availability_id: slot.id,
                    adults: 2,
                    children: 0,
                    special_requests: None,
                    payment_intent_id: None,
                    travelers: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    fn card_payment(booking_id: i64, status: PaymentState) -> NewPayment {
        NewPayment {
            booking_id,
            amount: dec!(120),
            currency: None,
            payment_method: "card".into(),
            payment_intent_id: Some("pi_3Nx".into()),
            status,
        }
    }

    #[tokio::test]
    async fn test_succeeded_payment_marks_booking_paid() {
        let store = Arc::new(MemoryStore::new());
        let booking = booked(&store).await;
        let payments = PaymentOrchestrator::new(store.clone(), "eur");

        let payment = payments.record(card_payment(booking.id, PaymentState::Succeeded)).await.unwrap();
        assert_eq!(payment.currency, "EUR");

        let mgr = BookingManager::new(store.clone(), store.clone(), BookingPolicy::default());
        let after = mgr.get(booking.id).await.unwrap();
        assert_eq!(after.payment_status, PaymentStatus::Paid);
        assert_eq!(after.payment_intent_id.as_deref(), Some("pi_3Nx"));
        assert_eq!(after.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_pending_payment_leaves_booking_alone() {
        let store = Arc::new(MemoryStore::new());
        let booking = booked(&store).await;
        let payments = PaymentOrchestrator::new(store.clone(), "USD");

        payments.record(card_payment(booking.id, PaymentState::Pending)).await.unwrap();
        let mgr = BookingManager::new(store.clone(), store.clone(), BookingPolicy::default());
        let after = mgr.get(booking.id).await.unwrap();
        assert_eq!(after.payment_status, PaymentStatus::Unpaid);
        assert_eq!(after.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_refund_marks_booking_refunded() {
        let store = Arc::new(MemoryStore::new());
        let booking = booked(&store).await;
        let payments = PaymentOrchestrator::new(store.clone(), "USD");
        let payment = payments.record(card_payment(booking.id, PaymentState::Succeeded)).await.unwrap();

        let refunded = payments
            .update(payment.id, PaymentUpdate { status: PaymentState::Refunded, refund_amount: Some(dec!(120)) })
            .await
            .unwrap();
        assert_eq!(refunded.refund_amount, dec!(120));

        let mgr = BookingManager::new(store.clone(), store.clone(), BookingPolicy::default());
        let after = mgr.get(booking.id).await.unwrap();
        assert_eq!(after.payment_status, PaymentStatus::Refunded);
        assert_eq!(after.status, BookingStatus::Refunded);
        let slot = store.get_slot(after.availability_id).await.unwrap().unwrap();
        assert_eq!(slot.spots_booked, 0);
    }

    #[tokio::test]
    async fn test_recording_a_refunded_payment_leaves_booking_alone() {
        let store = Arc::new(MemoryStore::new());
        let booking = booked(&store).await;
        let payments = PaymentOrchestrator::new(store.clone(), "USD");

        let payment = payments.record(card_payment(booking.id, PaymentState::Refunded)).await.unwrap();
        assert_eq!(payment.status, PaymentState::Refunded);

        let mgr = BookingManager::new(store.clone(), store.clone(), BookingPolicy::default());
        let after = mgr.get(booking.id).await.unwrap();
        assert_eq!(after.status, BookingStatus::Pending);
        assert_eq!(after.payment_status, PaymentStatus::Unpaid);
        let slot = store.get_slot(after.availability_id).await.unwrap().unwrap();
        assert_eq!(slot.spots_booked, 2);
    }

    #[tokio::test]
    async fn test_refund_above_amount_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let booking = booked(&store).await;
        let payments = PaymentOrchestrator::new(store.clone(), "USD");
        let payment = payments.record(card_payment(booking.id, PaymentState::Succeeded)).await.unwrap();

        let err = payments
            .update(payment.id, PaymentUpdate { status: PaymentState::Refunded, refund_amount: Some(dec!(500)) })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_payment_for_missing_booking() {
        let store = Arc::new(MemoryStore::new());
        let payments = PaymentOrchestrator::new(store.clone(), "USD");
        assert!(matches!(
            payments.record(card_payment(404, PaymentState::Succeeded)).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
