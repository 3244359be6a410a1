use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Ratings come from a fixed set of quality icons; anything outside it is a
/// caller bug.
pub fn validate_quality(quality: i32) -> Result<()> {
    if !(0..=5).contains(&quality) {
        bail!("quality rating {quality} is outside the valid range 0..=5");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datetime_round_trips_utc() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339(), "started_at").unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn parse_datetime_reports_field_on_garbage() {
        let err = parse_datetime("not-a-date", "ended_at").unwrap_err();
        assert!(err.to_string().contains("ended_at"));
    }

    #[test]
    fn quality_range_is_enforced() {
        for quality in 0..=5 {
            assert!(validate_quality(quality).is_ok());
        }
        assert!(validate_quality(-1).is_err());
        assert!(validate_quality(6).is_err());
    }
}
