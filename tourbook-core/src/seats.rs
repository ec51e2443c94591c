//! Seat accounting for availability slots.
//!
//! A slot's `spots_booked` always equals the seats held by its active
//! (pending or confirmed) bookings. Every booking mutation is planned here
//! against the locked slot row, and the store writes the booking and the
//! new counter in the same transaction.

use rust_decimal::Decimal;
use tracing::warn;

use crate::availability::AvailabilitySlot;
use crate::booking::{validate_party, Booking, BookingChanges, BookingStatus, NewBooking, PaymentStatus};
use crate::pricing;
use crate::{CoreError, CoreResult};

pub fn held_seats(status: BookingStatus, adults: i32, children: i32) -> i32 {
    if status.holds_seats() {
        adults.saturating_add(children)
    } else {
        0
    }
}

/// New `spots_booked` for `slot` after moving `delta` seats.
///
/// Growth is refused on a closed slot or beyond `max_spots`.
pub fn apply_delta(slot: &AvailabilitySlot, delta: i32) -> CoreResult<i32> {
    if delta > 0 {
        if !slot.is_available {
            return Err(CoreError::ValidationError(format!(
                "Slot {} is closed for booking",
                slot.id
            )));
        }
        let available = slot.free_spots();
        if delta > available {
            return Err(CoreError::CapacityExceeded { requested: delta, available });
        }
    }

    let next = slot.spots_booked + delta;
    if next < 0 {
        warn!(
            slot_id = slot.id,
            spots_booked = slot.spots_booked,
            delta,
            "Seat counter would go negative; clamping to zero"
        );
        return Ok(0);
    }
    Ok(next)
}

/// Counter value after inserting `booking` into `slot`.
pub fn plan_create(slot: &AvailabilitySlot, booking: &NewBooking) -> CoreResult<i32> {
    if slot.tour_id != booking.tour_id {
        return Err(CoreError::ValidationError(format!(
            "Availability {} does not belong to tour {}",
            slot.id, booking.tour_id
        )));
    }
    validate_party(booking.adults, booking.children)?;
    apply_delta(slot, booking.seats())
}

/// Resolved state of a booking after applying [`BookingChanges`].
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPlan {
    pub adults: i32,
    pub children: i32,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub total_price: Decimal,
    pub special_requests: Option<String>,
    /// Seats moved onto (positive) or off (negative) the slot.
    pub seat_delta: i32,
    /// Slot counter after the change.
    pub spots_booked: i32,
}

pub fn plan_update(
    existing: &Booking,
    slot: &AvailabilitySlot,
    changes: &BookingChanges,
) -> CoreResult<BookingPlan> {
    changes.validate()?;

    let adults = changes.adults.unwrap_or(existing.adults);
    let children = changes.children.unwrap_or(existing.children);
    let party_changed = adults != existing.adults || children != existing.children;
    if party_changed {
        validate_party(adults, children)?;
    }

    let status = changes.status.unwrap_or(existing.status);
    let seat_delta = held_seats(status, adults, children) - existing.held_seats();
    let spots_booked = if seat_delta != 0 {
        apply_delta(slot, seat_delta)?
    } else {
        slot.spots_booked
    };

    let total_price = match changes.total_price {
        Some(price) => price,
        None if party_changed => pricing::quote(slot, adults, children),
        None => existing.total_price,
    };

    Ok(BookingPlan {
        adults,
        children,
        status,
        payment_status: changes.payment_status.unwrap_or(existing.payment_status),
        payment_intent_id: changes
            .payment_intent_id
            .clone()
            .or_else(|| existing.payment_intent_id.clone()),
        total_price,
        special_requests: changes
            .special_requests
            .clone()
            .or_else(|| existing.special_requests.clone()),
        seat_delta,
        spots_booked,
    })
}

/// Counter value after deleting `existing` from `slot`.
pub fn plan_delete(existing: &Booking, slot: &AvailabilitySlot) -> CoreResult<i32> {
    apply_delta(slot, -existing.held_seats())
}
