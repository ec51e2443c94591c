use tourbook_core::CoreError;
use tracing::error;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

const BOOKING_NUMBER_CONSTRAINT: &str = "bookings_booking_number_key";
const CAPACITY_CONSTRAINT: &str = "availability_spots_within_capacity";

/// Translates a sqlx error into the domain error the API understands.
pub(crate) fn map_db_err(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code();
        let constraint = db_err.constraint().unwrap_or_default();
        if let Some(mapped) = constraint_error(code.as_deref(), constraint, db_err.message()) {
            return mapped;
        }
    }
    error!("Database error: {}", err);
    CoreError::StoreError(err.to_string())
}

fn constraint_error(code: Option<&str>, constraint: &str, message: &str) -> Option<CoreError> {
    let mapped = match code? {
        UNIQUE_VIOLATION if constraint == BOOKING_NUMBER_CONSTRAINT => {
            CoreError::DuplicateBookingNumber(message.to_string())
        }
        UNIQUE_VIOLATION => CoreError::Conflict(format!("duplicate value violates {}", constraint)),
        FOREIGN_KEY_VIOLATION => {
            CoreError::Conflict(format!("record is referenced or missing ({})", constraint))
        }
        // The row lock normally catches this first, so the exact counts are not known here.
        CHECK_VIOLATION if constraint == CAPACITY_CONSTRAINT => {
            CoreError::Conflict("Not enough seats left on this slot".to_string())
        }
        CHECK_VIOLATION => CoreError::ValidationError(format!("value violates {}", constraint)),
        _ => return None,
    };
    Some(mapped)
}

/// Parses a TEXT column into one of the core enums.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, CoreError>
where
    T: std::str::FromStr<Err = CoreError>,
{
    value.parse::<T>().map_err(|_| {
        CoreError::StoreError(format!("unexpected value {:?} in column {}", value, column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_check_reports_plain_conflict() {
        let err = constraint_error(Some(CHECK_VIOLATION), CAPACITY_CONSTRAINT, "new row violates check").unwrap();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(err.to_string(), "Conflict: Not enough seats left on this slot");
    }

    #[test]
    fn test_booking_number_clash_is_retryable() {
        let err = constraint_error(Some(UNIQUE_VIOLATION), BOOKING_NUMBER_CONSTRAINT, "dup").unwrap();
        assert!(matches!(err, CoreError::DuplicateBookingNumber(_)));
    }

    #[test]
    fn test_other_constraints() {
        assert!(matches!(
            constraint_error(Some(CHECK_VIOLATION), "tours_rating_range", ""),
            Some(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            constraint_error(Some(FOREIGN_KEY_VIOLATION), "bookings_tour_id_fkey", ""),
            Some(CoreError::Conflict(_))
        ));
        assert!(constraint_error(Some("40001"), "", "").is_none());
        assert!(constraint_error(None, "", "").is_none());
    }
}
