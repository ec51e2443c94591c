use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::require_non_empty;
use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tour {
    pub id: i64,
    pub vendor_id: Option<i64>,
    /// Short headline shown on listing cards.
    #[serde(rename = "abstract")]
    pub summary: String,
    pub description: String,
    pub activity_type: String,
    pub activity_type_label: Option<String>,
    pub is_online: bool,
    pub booked_in_24_hours: i32,
    pub is_reserve_now_pay_later: bool,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating or fully replacing a tour.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTour {
    #[serde(rename = "abstract")]
    pub summary: String,
    pub description: String,
    pub activity_type: String,
    pub activity_type_label: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub booked_in_24_hours: i32,
    #[serde(default)]
    pub is_reserve_now_pay_later: bool,
    pub vendor_id: Option<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

impl NewTour {
    pub fn validate(&self) -> CoreResult<()> {
        require_non_empty("abstract", &self.summary)?;
        require_non_empty("description", &self.description)?;
        require_non_empty("activity_type", &self.activity_type)?;
        if self.booked_in_24_hours < 0 {
            return Err(crate::CoreError::ValidationError(
                "booked_in_24_hours cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TourFilter {
    /// Case-insensitive substring match on category name.
    pub category: Option<String>,
    /// Case-insensitive substring match on abstract or description.
    pub search: Option<String>,
    pub vendor_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl NewCategory {
    pub fn validate(&self) -> CoreResult<()> {
        require_non_empty("name", &self.name)?;
        require_non_empty("code", &self.code)
    }
}
