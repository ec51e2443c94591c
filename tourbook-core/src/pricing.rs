use rust_decimal::Decimal;

use crate::availability::AvailabilitySlot;

/// Price of a party on a slot. Children pay the adult rate when the slot has no child rate.
pub fn quote(slot: &AvailabilitySlot, adults: i32, children: i32) -> Decimal {
    let child_rate = slot.price_child.unwrap_or(slot.price_adult);
    slot.price_adult * Decimal::from(adults) + child_rate * Decimal::from(children)
}
