use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Longest date range accepted by a single bulk create.
pub const MAX_BULK_DAYS: u64 = 366;

/// A bookable date/time instance of a tour with fixed capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySlot {
    pub id: i64,
    pub tour_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub max_spots: i32,
    pub spots_booked: i32,
    pub price_adult: Decimal,
    pub price_child: Option<Decimal>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_name: Option<String>,
}

impl AvailabilitySlot {
    pub fn free_spots(&self) -> i32 {
        (self.max_spots - self.spots_booked).max(0)
    }

    pub fn is_bookable(&self) -> bool {
        self.is_available && self.free_spots() > 0
    }
}

/// Schedule and pricing fields of a slot, shared by create, update and bulk templates.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SlotTemplate {
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub max_spots: i32,
    pub price_adult: Decimal,
    pub price_child: Option<Decimal>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

impl SlotTemplate {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_spots <= 0 {
            return Err(CoreError::ValidationError("max_spots must be positive".to_string()));
        }
        if self.price_adult < Decimal::ZERO {
            return Err(CoreError::ValidationError("price_adult cannot be negative".to_string()));
        }
        if matches!(self.price_child, Some(p) if p < Decimal::ZERO) {
            return Err(CoreError::ValidationError("price_child cannot be negative".to_string()));
        }
        if let Some(end) = self.end_time {
            if end <= self.start_time {
                return Err(CoreError::ValidationError(
                    "end_time must be after start_time".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewSlot {
    pub tour_id: i64,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub schedule: SlotTemplate,
}

impl NewSlot {
    pub fn validate(&self) -> CoreResult<()> {
        self.schedule.validate()
    }
}

/// Full replacement of a slot's schedule; `spots_booked` is never client-writable.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotUpdate {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub schedule: SlotTemplate,
}

impl SlotUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        self.schedule.validate()
    }

    /// A slot's capacity may not drop below what is already booked.
    pub fn check_against(&self, slot: &AvailabilitySlot) -> CoreResult<()> {
        if self.schedule.max_spots < slot.spots_booked {
            return Err(CoreError::ValidationError(format!(
                "max_spots {} is below the {} seats already booked",
                self.schedule.max_spots, slot.spots_booked
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkSlotRequest {
    pub tour_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub slots: Vec<SlotTemplate>,
}

impl BulkSlotRequest {
    pub fn validate(&self) -> CoreResult<()> {
        if self.end_date < self.start_date {
            return Err(CoreError::ValidationError(
                "end_date must not be before start_date".to_string(),
            ));
        }
        let days = (self.end_date - self.start_date).num_days() as u64 + 1;
        if days > MAX_BULK_DAYS {
            return Err(CoreError::ValidationError(format!(
                "Date range spans {} days; at most {} allowed",
                days, MAX_BULK_DAYS
            )));
        }
        if self.slots.is_empty() {
            return Err(CoreError::ValidationError("At least one slot template is required".to_string()));
        }
        self.slots.iter().try_for_each(SlotTemplate::validate)
    }

    /// One slot per template per day, both ends of the range inclusive.
    pub fn expand(&self) -> Vec<NewSlot> {
        let mut out = Vec::new();
        let mut day = self.start_date;
        while day <= self.end_date {
            for template in &self.slots {
                out.push(NewSlot {
                    tour_id: self.tour_id,
                    date: day,
                    schedule: template.clone(),
                });
            }
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityFilter {
    pub tour_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub is_available: Option<bool>,
    pub vendor_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn template(start: &str) -> SlotTemplate {
        SlotTemplate {
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: None,
            max_spots: 12,
            price_adult: dec!(45.00),
            price_child: Some(dec!(20.00)),
            is_available: true,
        }
    }

    #[test]
    fn test_bulk_expand_is_inclusive() {
        let req = BulkSlotRequest {
            tour_id: 3,
            start_date: NaiveDate::from_ymd_opt(2025, 2, 27).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            slots: vec![template("09:00"), template("14:00")],
        };
        req.validate().unwrap();

        let slots = req.expand();
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0].date, NaiveDate::from_ymd_opt(2025, 2, 27).unwrap());
        assert_eq!(slots[5].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert!(slots.iter().all(|s| s.tour_id == 3));
    }

    #[test]
    fn test_bulk_rejects_reversed_range() {
        let req = BulkSlotRequest {
            tour_id: 1,
            start_date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            slots: vec![template("09:00")],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_template_rejects_end_before_start() {
        let mut t = template("10:00");
        t.end_time = Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_new_slot_defaults_to_available() {
        let json = r#"{
            "tour_id": 4,
            "date": "2025-06-01",
            "start_time": "08:30:00",
            "max_spots": 10,
            "price_adult": "59.90"
        }"#;
        let slot: NewSlot = serde_json::from_str(json).expect("Failed to deserialize");
        assert!(slot.schedule.is_available);
        assert_eq!(slot.schedule.price_adult, dec!(59.90));
        assert!(slot.validate().is_ok());
    }
}
