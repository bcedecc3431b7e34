#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    pub(super) delegate: chrono::Duration,
}

impl Duration {
    pub(super) fn new(delegate: chrono::Duration) -> Self {
        Self { delegate }
    }

    pub fn zero() -> Self {
        Self::new(chrono::Duration::zero())
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(chrono::Duration::hours(hours))
    }

    pub fn minutes(minutes: i64) -> Self {
        Self::new(chrono::Duration::minutes(minutes))
    }

    pub fn seconds(seconds: i64) -> Self {
        Self::new(chrono::Duration::seconds(seconds))
    }

    /// `None` if the value exceeds the representable range.
    pub fn try_seconds(seconds: i64) -> Option<Self> {
        chrono::Duration::try_seconds(seconds).map(Self::new)
    }

    pub fn millis(millis: i64) -> Self {
        Self::new(chrono::Duration::milliseconds(millis))
    }

    pub fn as_secs(&self) -> i64 {
        self.delegate.num_seconds()
    }

    pub fn is_positive(&self) -> bool {
        self.delegate > chrono::Duration::zero()
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.delegate.num_milliseconds() as f64 / 1000.0)
    }
}

impl std::ops::Add<Duration> for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate + rhs.delegate)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(val: Duration) -> Self {
        let millis = val.delegate.num_milliseconds().max(0);
        std::time::Duration::from_millis(millis as u64)
    }
}
