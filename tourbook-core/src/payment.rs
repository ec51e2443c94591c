use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::booking::{Booking, BookingChanges, BookingStatus, PaymentStatus};
use crate::validation::require_non_empty;
use crate::{CoreError, CoreResult};

/// State of a single payment attempt, as reported by the payment provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Succeeded => "succeeded",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentState::Pending),
            "succeeded" => Ok(PaymentState::Succeeded),
            "failed" => Ok(PaymentState::Failed),
            "refunded" => Ok(PaymentState::Refunded),
            other => Err(CoreError::ValidationError(format!("Unknown payment state: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
    pub status: PaymentState,
    pub refund_amount: Decimal,
    pub payment_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub booking_id: i64,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
    pub status: PaymentState,
}

impl NewPayment {
    pub fn validate(&self) -> CoreResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(CoreError::ValidationError("amount must be positive".to_string()));
        }
        require_non_empty("payment_method", &self.payment_method)?;
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CoreError::ValidationError(format!("Invalid currency code: {}", currency)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentUpdate {
    pub status: PaymentState,
    pub refund_amount: Option<Decimal>,
}

impl PaymentUpdate {
    pub fn validate(&self, payment: &Payment) -> CoreResult<()> {
        if let Some(refund) = self.refund_amount {
            if refund < Decimal::ZERO || refund > payment.amount {
                return Err(CoreError::ValidationError(format!(
                    "refund_amount must be between 0 and {}",
                    payment.amount
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub booking_id: Option<i64>,
    pub status: Option<PaymentState>,
    pub payment_method: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub user_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Whether a payment is being created or an existing one moved to a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Recorded,
    Updated,
}

/// Change a payment in `state` applies to its owning booking, if any.
///
/// A successful payment marks the booking paid, records the intent reference
/// and confirms a pending booking. Refunds only count when an existing payment
/// is moved to refunded; they mark both the payment status and the booking
/// itself refunded, which releases its seats.
pub fn booking_effect(
    event: PaymentEvent,
    state: PaymentState,
    booking: &Booking,
    payment_intent_id: Option<&str>,
) -> Option<BookingChanges> {
    match state {
        PaymentState::Succeeded => {
            let mut changes = BookingChanges::payment(
                PaymentStatus::Paid,
                payment_intent_id.map(str::to_owned),
            );
            if booking.status == BookingStatus::Pending {
                changes.status = Some(BookingStatus::Confirmed);
            }
            Some(changes)
        }
        PaymentState::Refunded if event == PaymentEvent::Updated => Some(BookingChanges {
            status: Some(BookingStatus::Refunded),
            payment_status: Some(PaymentStatus::Refunded),
            ..Default::default()
        }),
        PaymentState::Refunded | PaymentState::Pending | PaymentState::Failed => None,
    }
}
