use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::account::{
    NewUser, NewVendor, PasswordResetToken, User, UserFilter, UserUpdate, Vendor, VendorFilter,
    VendorProfile,
};
use crate::availability::{AvailabilityFilter, AvailabilitySlot, NewSlot, SlotUpdate};
use crate::booking::{Booking, BookingChanges, BookingFilter, NewBooking, NewTraveler, Traveler};
use crate::catalog::{Category, NewCategory, NewTour, Tour, TourFilter};
use crate::payment::{NewPayment, Payment, PaymentFilter, PaymentUpdate};
use crate::CoreResult;

#[async_trait]
pub trait TourRepository: Send + Sync {
    async fn list_tours(&self, filter: &TourFilter) -> CoreResult<Vec<Tour>>;

    async fn get_tour(&self, id: i64) -> CoreResult<Option<Tour>>;

    async fn create_tour(&self, tour: &NewTour) -> CoreResult<Tour>;

    /// Replaces every editable field, including category links.
    async fn update_tour(&self, id: i64, tour: &NewTour) -> CoreResult<Tour>;

    async fn delete_tour(&self, id: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list_categories(&self) -> CoreResult<Vec<Category>>;

    async fn get_category(&self, id: i64) -> CoreResult<Option<Category>>;

    async fn create_category(&self, category: &NewCategory) -> CoreResult<Category>;

    async fn update_category(&self, id: i64, category: &NewCategory) -> CoreResult<Category>;

    async fn delete_category(&self, id: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list_users(&self, filter: &UserFilter) -> CoreResult<Vec<User>>;

    async fn get_user(&self, id: i64) -> CoreResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn create_user(&self, user: &NewUser) -> CoreResult<User>;

    async fn update_user(&self, id: i64, update: &UserUpdate) -> CoreResult<User>;

    async fn update_password(&self, id: i64, password_hash: &str) -> CoreResult<()>;

    async fn delete_user(&self, id: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    /// Stores `token` for the user, replacing any earlier one.
    async fn upsert_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn find_reset_token(&self, token: &str) -> CoreResult<Option<PasswordResetToken>>;

    async fn delete_reset_token(&self, token: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn list_vendors(&self, filter: &VendorFilter) -> CoreResult<Vec<Vendor>>;

    async fn get_vendor(&self, id: i64) -> CoreResult<Option<Vendor>>;

    async fn get_vendor_by_user_id(&self, user_id: i64) -> CoreResult<Option<Vendor>>;

    async fn create_vendor(&self, vendor: &NewVendor) -> CoreResult<Vendor>;

    async fn update_vendor(&self, id: i64, profile: &VendorProfile) -> CoreResult<Vendor>;

    async fn delete_vendor(&self, id: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn list_slots(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<AvailabilitySlot>>;

    /// Open slots of `tour_id` on `date` that still have free seats.
    async fn available_slots(&self, tour_id: i64, date: NaiveDate) -> CoreResult<Vec<AvailabilitySlot>>;

    async fn get_slot(&self, id: i64) -> CoreResult<Option<AvailabilitySlot>>;

    async fn create_slot(&self, slot: &NewSlot) -> CoreResult<AvailabilitySlot>;

    /// Inserts all slots or none.
    async fn create_slots(&self, slots: &[NewSlot]) -> CoreResult<Vec<AvailabilitySlot>>;

    /// Fails when the new capacity is below the seats already booked.
    async fn update_slot(&self, id: i64, update: &SlotUpdate) -> CoreResult<AvailabilitySlot>;

    /// Fails while any seats on the slot are held.
    async fn delete_slot(&self, id: i64) -> CoreResult<()>;
}

/// Booking writes are atomic with the seat counter of the booked slot.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>>;

    async fn get_booking(&self, id: i64) -> CoreResult<Option<Booking>>;

    async fn get_booking_by_number(&self, booking_number: &str) -> CoreResult<Option<Booking>>;

    /// Reserves the party's seats and inserts the booking with its travelers.
    ///
    /// Returns `DuplicateBookingNumber` when the number is already taken.
    async fn create_booking(&self, booking: &NewBooking) -> CoreResult<Booking>;

    /// Applies `changes` and moves the seat difference on the slot.
    async fn update_booking(&self, id: i64, changes: &BookingChanges) -> CoreResult<Booking>;

    /// Releases held seats and removes the booking with its travelers.
    async fn delete_booking(&self, id: i64) -> CoreResult<()>;

    async fn list_travelers(&self, booking_id: i64) -> CoreResult<Vec<Traveler>>;

    async fn add_traveler(&self, booking_id: i64, traveler: &NewTraveler) -> CoreResult<Traveler>;
}

/// Payment writes are atomic with the effect they have on the owning booking.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn list_payments(&self, filter: &PaymentFilter) -> CoreResult<Vec<Payment>>;

    async fn get_payment(&self, id: i64) -> CoreResult<Option<Payment>>;

    async fn record_payment(&self, payment: &NewPayment) -> CoreResult<Payment>;

    async fn update_payment(&self, id: i64, update: &PaymentUpdate) -> CoreResult<Payment>;
}
