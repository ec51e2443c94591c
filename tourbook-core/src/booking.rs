use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::{require_email, require_non_empty};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
        }
    }

    /// Whether a booking in this status occupies seats on its slot.
    pub fn holds_seats(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(CoreError::ValidationError(format!("Unknown booking status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    PartiallyPaid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::PartiallyPaid => "partially-paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "partially-paid" => Ok(PaymentStatus::PartiallyPaid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(CoreError::ValidationError(format!("Unknown payment status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub booking_number: String,
    pub user_id: Option<i64>,
    pub tour_id: i64,
    pub availability_id: i64,
    pub adults: i32,
    pub children: i32,
    pub total_price: Decimal,
    pub special_requests: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub booking_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_time: Option<NaiveTime>,
}

impl Booking {
    pub fn seats(&self) -> i32 {
        self.adults.saturating_add(self.children)
    }

    /// Seats this booking currently occupies on its slot.
    pub fn held_seats(&self) -> i32 {
        crate::seats::held_seats(self.status, self.adults, self.children)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelerType {
    #[default]
    Adult,
    Child,
}

impl TravelerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelerType::Adult => "adult",
            TravelerType::Child => "child",
        }
    }
}

impl FromStr for TravelerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adult" => Ok(TravelerType::Adult),
            "child" => Ok(TravelerType::Child),
            other => Err(CoreError::ValidationError(format!("Unknown traveler type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Traveler {
    pub id: i64,
    pub booking_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_lead: bool,
    pub traveler_type: TravelerType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTraveler {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_lead: bool,
    #[serde(default)]
    pub traveler_type: TravelerType,
}

impl NewTraveler {
    pub fn validate(&self) -> CoreResult<()> {
        require_non_empty("first_name", &self.first_name)?;
        require_non_empty("last_name", &self.last_name)?;
        if let Some(email) = &self.email {
            require_email(email)?;
        }
        Ok(())
    }
}

/// Checkout input as submitted by a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub tour_id: i64,
    pub availability_id: i64,
    pub adults: i32,
    #[serde(default)]
    pub children: i32,
    pub special_requests: Option<String>,
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub travelers: Vec<NewTraveler>,
}

impl BookingRequest {
    pub fn validate(&self) -> CoreResult<()> {
        validate_party(self.adults, self.children)?;
        validate_travelers(&self.travelers)
    }
}

pub fn validate_party(adults: i32, children: i32) -> CoreResult<()> {
    if adults < 0 || children < 0 {
        return Err(CoreError::ValidationError(
            "adults and children cannot be negative".to_string(),
        ));
    }
    match adults.checked_add(children) {
        None => Err(CoreError::ValidationError(
            "adults and children add up to more seats than any slot holds".to_string(),
        )),
        Some(seats) if seats < 1 => Err(CoreError::ValidationError(
            "A booking needs at least one traveler".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

pub fn validate_travelers(travelers: &[NewTraveler]) -> CoreResult<()> {
    travelers.iter().try_for_each(NewTraveler::validate)?;
    if travelers.iter().filter(|t| t.is_lead).count() > 1 {
        return Err(CoreError::ValidationError(
            "Only one lead traveler is allowed".to_string(),
        ));
    }
    Ok(())
}

/// A fully priced booking ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_number: String,
    pub user_id: Option<i64>,
    pub tour_id: i64,
    pub availability_id: i64,
    pub adults: i32,
    pub children: i32,
    pub total_price: Decimal,
    pub special_requests: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub travelers: Vec<NewTraveler>,
}

impl NewBooking {
    pub fn seats(&self) -> i32 {
        self.adults.saturating_add(self.children)
    }
}

/// Partial change to an existing booking. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingChanges {
    pub status: Option<BookingStatus>,
    pub adults: Option<i32>,
    pub children: Option<i32>,
    /// Explicit price override; otherwise the price is re-quoted when the party changes.
    pub total_price: Option<Decimal>,
    pub special_requests: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
}

impl BookingChanges {
    pub fn status(status: BookingStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn payment(payment_status: PaymentStatus, payment_intent_id: Option<String>) -> Self {
        Self { payment_status: Some(payment_status), payment_intent_id, ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.adults.is_none()
            && self.children.is_none()
            && self.total_price.is_none()
            && self.special_requests.is_none()
            && self.payment_status.is_none()
            && self.payment_intent_id.is_none()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if matches!(self.adults, Some(a) if a < 0) || matches!(self.children, Some(c) if c < 0) {
            return Err(CoreError::ValidationError(
                "adults and children cannot be negative".to_string(),
            ));
        }
        if matches!(self.total_price, Some(p) if p < Decimal::ZERO) {
            return Err(CoreError::ValidationError("total_price cannot be negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub user_id: Option<i64>,
    pub tour_id: Option<i64>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub vendor_id: Option<i64>,
    pub limit: Option<i64>,
}
