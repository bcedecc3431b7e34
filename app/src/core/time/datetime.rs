use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use tokio::task_local;

use super::Duration;

task_local! {
    pub static FIXED_NOW: DateTime;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DateTime {
    delegate: chrono::DateTime<chrono::Utc>,
}

impl DateTime {
    fn new<T: chrono::TimeZone>(delegate: chrono::DateTime<T>) -> Self {
        Self {
            delegate: delegate.with_timezone(&chrono::Utc),
        }
    }

    pub fn now() -> Self {
        FIXED_NOW
            .try_with(|t| *t)
            .unwrap_or_else(|_| chrono::Utc::now().into())
    }

    pub fn from_iso(iso8601: &str) -> anyhow::Result<Self> {
        Ok(chrono::DateTime::parse_from_rfc3339(iso8601)?.into())
    }

    pub fn to_iso_string(&self) -> String {
        self.delegate.to_rfc3339()
    }

    /// Nanoseconds since the unix epoch, `None` outside of the years 1677 to 2262.
    pub fn timestamp_nanos(&self) -> Option<i64> {
        self.delegate.timestamp_nanos_opt()
    }

    pub fn elapsed_since(&self, since: Self) -> Duration {
        Duration::new(self.delegate - since.delegate)
    }

    pub fn elapsed(&self) -> Duration {
        Self::now().elapsed_since(*self)
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.delegate.to_rfc3339())
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate + rhs.delegate)
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate - rhs.delegate)
    }
}

impl<T: chrono::TimeZone> From<chrono::DateTime<T>> for DateTime {
    fn from(val: chrono::DateTime<T>) -> Self {
        DateTime::new(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_of_epoch_offset() {
        let dt = DateTime::from_iso("2024-01-01T00:00:00Z").unwrap();

        assert_eq!(dt.timestamp_nanos(), Some(1_704_067_200_000_000_000));
    }

    #[test]
    fn parsing_normalizes_offsets() {
        let utc = DateTime::from_iso("2024-01-01T10:00:00Z").unwrap();
        let cet = DateTime::from_iso("2024-01-01T11:00:00+01:00").unwrap();

        assert_eq!(utc, cet);
    }

    #[tokio::test]
    async fn now_can_be_fixed_per_task() {
        let fixed = DateTime::from_iso("2024-11-03T15:23:46Z").unwrap();

        let now = FIXED_NOW.scope(fixed, async { DateTime::now() }).await;

        assert_eq!(now, fixed);
    }

    #[test]
    fn elapsed_since_is_signed_difference() {
        let start = DateTime::from_iso("2024-11-03T15:23:46Z").unwrap();
        let end = DateTime::from_iso("2024-11-03T15:24:46Z").unwrap();

        assert_eq!(end.elapsed_since(start), Duration::seconds(60));
        assert_eq!(start.elapsed_since(end), Duration::seconds(-60));
    }
}
