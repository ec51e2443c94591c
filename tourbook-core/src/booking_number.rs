use chrono::Utc;
use rand::Rng;

pub const DEFAULT_PREFIX: &str = "RSQ";

/// Human-facing booking reference: prefix, the last eight digits of the
/// current Unix time in milliseconds, and a three-digit random suffix.
///
/// Not globally unique on its own; the store enforces uniqueness and the
/// booking service regenerates on collision.
pub fn generate(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().rem_euclid(100_000_000);
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{}{:08}{:03}", prefix, millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let number = generate(DEFAULT_PREFIX);
        assert!(number.starts_with("RSQ"));
        assert_eq!(number.len(), 3 + 8 + 3);
        assert!(number[3..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_custom_prefix() {
        assert!(generate("TB-").starts_with("TB-"));
    }
}
