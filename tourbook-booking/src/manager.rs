use std::sync::Arc;

use tourbook_core::booking::{
    Booking, BookingChanges, BookingFilter, BookingRequest, BookingStatus, NewBooking, NewTraveler, PaymentStatus,
    Traveler,
};
use tourbook_core::booking_number;
use tourbook_core::pricing;
use tourbook_core::repository::{AvailabilityRepository, BookingRepository};
use tourbook_core::{CoreError, CoreResult};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub number_prefix: String,
    /// How many fresh booking numbers to try before giving up on a create.
    pub number_attempts: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            number_prefix: booking_number::DEFAULT_PREFIX.to_string(),
            number_attempts: 5,
        }
    }
}

/// Booking lifecycle on top of the repositories.
///
/// Prices are always quoted here from the slot; seat accounting happens
/// atomically inside the repository.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    availability: Arc<dyn AvailabilityRepository>,
    policy: BookingPolicy,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        availability: Arc<dyn AvailabilityRepository>,
        policy: BookingPolicy,
    ) -> Self {
        Self { bookings, availability, policy }
    }

    /// Books `request` for `user_id`. New bookings start pending and unpaid.
    pub async fn create(&self, user_id: Option<i64>, request: BookingRequest) -> CoreResult<Booking> {
        request.validate()?;

        let slot = self
            .availability
            .get_slot(request.availability_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Availability {}", request.availability_id)))?;
        if slot.tour_id != request.tour_id {
            return Err(CoreError::ValidationError(format!(
                "Availability {} does not belong to tour {}",
                slot.id, request.tour_id
            )));
        }

        let mut booking = NewBooking {
            booking_number: String::new(),
            user_id,
            tour_id: request.tour_id,
            availability_id: request.availability_id,
            adults: request.adults,
            children: request.children,
            total_price: pricing::quote(&slot, request.adults, request.children),
            special_requests: request.special_requests,
            payment_status: PaymentStatus::Unpaid,
            payment_intent_id: request.payment_intent_id,
            travelers: request.travelers,
        };

        let attempts = self.policy.number_attempts.max(1);
        for attempt in 1..=attempts {
            booking.booking_number = booking_number::generate(&self.policy.number_prefix);
            match self.bookings.create_booking(&booking).await {
                Ok(created) => return Ok(created),
                Err(CoreError::DuplicateBookingNumber(number)) => {
                    warn!(attempt, number = %number, "Booking number collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::Conflict(format!(
            "Could not allocate a unique booking number after {} attempts",
            attempts
        )))
    }

    pub async fn list(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
        self.bookings.list_bookings(filter).await
    }

    pub async fn get(&self, id: i64) -> CoreResult<Booking> {
        self.bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", id)))
    }

    pub async fn get_by_number(&self, booking_number: &str) -> CoreResult<Booking> {
        self.bookings
            .get_booking_by_number(booking_number)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {}", booking_number)))
    }

    pub async fn update(&self, id: i64, changes: BookingChanges) -> CoreResult<Booking> {
        if changes.is_empty() {
            return Err(CoreError::ValidationError("No changes supplied".to_string()));
        }
        changes.validate()?;
        let updated = self.bookings.update_booking(id, &changes).await?;
        info!(booking_id = id, status = %updated.status, "Booking updated");
        Ok(updated)
    }

    /// Status moves share the seat rule: leaving pending/confirmed frees
    /// seats, coming back re-reserves them if the slot still has room.
    pub async fn set_status(&self, id: i64, status: BookingStatus) -> CoreResult<Booking> {
        self.update(id, BookingChanges::status(status)).await
    }

    pub async fn set_payment_status(
        &self,
        id: i64,
        payment_status: PaymentStatus,
        payment_intent_id: Option<String>,
    ) -> CoreResult<Booking> {
        self.update(id, BookingChanges::payment(payment_status, payment_intent_id)).await
    }

    pub async fn delete(&self, id: i64) -> CoreResult<()> {
        self.bookings.delete_booking(id).await
    }

    pub async fn travelers(&self, booking_id: i64) -> CoreResult<Vec<Traveler>> {
        self.get(booking_id).await?;
        self.bookings.list_travelers(booking_id).await
    }

    pub async fn add_traveler(&self, booking_id: i64, traveler: NewTraveler) -> CoreResult<Traveler> {
        traveler.validate()?;
        self.bookings.add_traveler(booking_id, &traveler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tourbook_core::availability::{AvailabilitySlot, NewSlot, SlotTemplate};
    use tourbook_core::booking::BookingFilter;
    use tourbook_core::catalog::NewTour;
    use tourbook_core::repository::{AvailabilityRepository, TourRepository};
    use tourbook_store::MemoryStore;

    async fn setup(max_spots: i32) -> (Arc<MemoryStore>, AvailabilitySlot) {
        let store = Arc::new(MemoryStore::new());
        let tour = store
            .create_tour(&NewTour {
                summary: "Old town walk".into(),
                description: "Guided walking tour".into(),
                activity_type: "walking".into(),
                activity_type_label: Some("Walking tour".into()),
                is_online: false,
                booked_in_24_hours: 0,
                is_reserve_now_pay_later: false,
                vendor_id: None,
                category_ids: Vec::new(),
            })
            .await
            .unwrap();
        let slot = store
            .create_slot(&NewSlot {
                tour_id: tour.id,
                date: NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
                schedule: SlotTemplate {
                    start_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    end_time: Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
                    max_spots,
                    price_adult: dec!(25),
                    price_child: None,
                    is_available: true,
                },
            })
            .await
            .unwrap();
        (store, slot)
    }

    fn manager(store: &Arc<MemoryStore>) -> BookingManager {
        BookingManager::new(store.clone(), store.clone(), BookingPolicy::default())
    }

    fn request(slot: &AvailabilitySlot, adults: i32, children: i32) -> BookingRequest {
        BookingRequest {
            tour_id: slot.tour_id,
            availability_id: slot.id,
            adults,
            children,
            special_requests: None,
            payment_intent_id: None,
            travelers: Vec::new(),
        }
    }

    async fn spots(store: &MemoryStore, id: i64) -> i32 {
        store.get_slot(id).await.unwrap().unwrap().spots_booked
    }

    #[tokio::test]
    async fn test_create_quotes_price_and_reserves_seats() {
        let (store, slot) = setup(10).await;
        let booking = manager(&store).create(None, request(&slot, 2, 1)).await.unwrap();

        assert_eq!(booking.total_price, dec!(75));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Unpaid);
        assert!(booking.booking_number.starts_with("RSQ"));
        assert_eq!(spots(&store, slot.id).await, 3);
    }

    #[tokio::test]
    async fn test_fill_to_capacity_then_reject() {
        let (store, slot) = setup(10).await;
        let mgr = manager(&store);
        mgr.create(None, request(&slot, 8, 0)).await.unwrap();
        mgr.create(None, request(&slot, 2, 0)).await.unwrap();
        assert_eq!(spots(&store, slot.id).await, 10);

        let err = mgr.create(None, request(&slot, 1, 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 1, available: 0 }));
        assert_eq!(spots(&store, slot.id).await, 10);
    }

    #[tokio::test]
    async fn test_wrong_tour_is_rejected() {
        let (store, slot) = setup(10).await;
        let mut req = request(&slot, 1, 0);
        req.tour_id += 100;
        assert!(matches!(
            manager(&store).create(None, req).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_party_change_moves_counter_by_difference() {
        let (store, slot) = setup(10).await;
        let mgr = manager(&store);
        let booking = mgr.create(None, request(&slot, 2, 1)).await.unwrap();

        let changes = BookingChanges { adults: Some(1), children: Some(1), ..Default::default() };
        let updated = mgr.update(booking.id, changes).await.unwrap();
        assert_eq!(spots(&store, slot.id).await, 2);
        assert_eq!(updated.total_price, dec!(50));
    }

    #[tokio::test]
    async fn test_cancel_then_reactivate() {
        let (store, slot) = setup(4).await;
        let mgr = manager(&store);
        let booking = mgr.create(None, request(&slot, 3, 0)).await.unwrap();

        mgr.set_status(booking.id, BookingStatus::Cancelled).await.unwrap();
        assert_eq!(spots(&store, slot.id).await, 0);

        mgr.create(None, request(&slot, 2, 0)).await.unwrap();
        let err = mgr.set_status(booking.id, BookingStatus::Confirmed).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { .. }));
        assert_eq!(spots(&store, slot.id).await, 2);
    }

    #[tokio::test]
    async fn test_delete_releases_seats() {
        let (store, slot) = setup(10).await;
        let mgr = manager(&store);
        let booking = mgr.create(None, request(&slot, 2, 2)).await.unwrap();
        mgr.delete(booking.id).await.unwrap();

        assert_eq!(spots(&store, slot.id).await, 0);
        assert!(matches!(mgr.get(booking.id).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected() {
        let (store, slot) = setup(10).await;
        let mgr = manager(&store);
        let booking = mgr.create(None, request(&slot, 1, 0)).await.unwrap();
        assert!(matches!(
            mgr.update(booking.id, BookingChanges::default()).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    /// Hands out a taken booking number a fixed number of times before delegating.
    struct CollidingBookings {
        inner: Arc<MemoryStore>,
        collisions_left: AtomicU32,
    }

    #[async_trait]
    impl BookingRepository for CollidingBookings {
        async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
            self.inner.list_bookings(filter).await
        }
        async fn get_booking(&self, id: i64) -> CoreResult<Option<Booking>> {
            self.inner.get_booking(id).await
        }
        async fn get_booking_by_number(&self, number: &str) -> CoreResult<Option<Booking>> {
            self.inner.get_booking_by_number(number).await
        }
        async fn create_booking(&self, booking: &NewBooking) -> CoreResult<Booking> {
            let left = self.collisions_left.load(Ordering::SeqCst);
            if left > 0 {
                self.collisions_left.store(left - 1, Ordering::SeqCst);
                return Err(CoreError::DuplicateBookingNumber(booking.booking_number.clone()));
            }
            self.inner.create_booking(booking).await
        }
        async fn update_booking(&self, id: i64, changes: &BookingChanges) -> CoreResult<Booking> {
            self.inner.update_booking(id, changes).await
        }
        async fn delete_booking(&self, id: i64) -> CoreResult<()> {
            self.inner.delete_booking(id).await
        }
        async fn list_travelers(&self, booking_id: i64) -> CoreResult<Vec<Traveler>> {
            self.inner.list_travelers(booking_id).await
        }
        async fn add_traveler(&self, booking_id: i64, t: &NewTraveler) -> CoreResult<Traveler> {
            self.inner.add_traveler(booking_id, t).await
        }
    }

    #[tokio::test]
    async fn test_booking_number_collision_is_retried() {
        let (store, slot) = setup(10).await;
        let repo = Arc::new(CollidingBookings { inner: store.clone(), collisions_left: AtomicU32::new(2) });
        let mgr = BookingManager::new(repo, store.clone(), BookingPolicy::default());

        mgr.create(None, request(&slot, 1, 0)).await.unwrap();
        assert_eq!(spots(&store, slot.id).await, 1);
    }

    #[tokio::test]
    async fn test_booking_number_attempts_exhausted() {
        let (store, slot) = setup(10).await;
        let repo = Arc::new(CollidingBookings { inner: store.clone(), collisions_left: AtomicU32::new(10) });
        let policy = BookingPolicy { number_prefix: "TB".into(), number_attempts: 3 };
        let mgr = BookingManager::new(repo, store.clone(), policy);

        assert!(matches!(mgr.create(None, request(&slot, 1, 0)).await, Err(CoreError::Conflict(_))));
        assert_eq!(spots(&store, slot.id).await, 0);
    }
}
