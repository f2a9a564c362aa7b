use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rand_core::OsRng;

use crate::errors::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Fixed-width UTC format used for every stored timestamp, so that string
/// comparison in SQL is chronological.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::internal(format!("invalid password hash: {err}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a query-string date bound. RFC 3339 is taken as-is; a bare
/// `YYYY-MM-DD` covers the whole day, so an end bound lands on its last
/// microsecond.
pub fn parse_date_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("invalid date: {raw}")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| AppError::internal("invalid time of day"))?;

    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert_eq!(format_timestamp(early), "2026-01-02T03:04:05.000000Z");
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn bare_dates_cover_the_whole_day() {
        let start = parse_date_bound("2026-03-01", false).unwrap();
        let end = parse_date_bound("2026-03-01", true).unwrap();
        assert_eq!(format_timestamp(start), "2026-03-01T00:00:00.000000Z");
        assert_eq!(format_timestamp(end), "2026-03-01T23:59:59.999999Z");
    }

    #[test]
    fn rfc3339_bounds_are_normalised_to_utc() {
        let bound = parse_date_bound("2026-03-01T10:00:00+02:00", true).unwrap();
        assert_eq!(format_timestamp(bound), "2026-03-01T08:00:00.000000Z");
        assert!(parse_date_bound("yesterday", false).is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(hash_password("short").is_err());
        let hash = hash_password("long enough").unwrap();
        assert!(verify_password("long enough", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }
}
