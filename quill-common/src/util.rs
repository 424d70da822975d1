use thiserror::Error;
use time::Duration;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    pub fn from_seconds(seconds: u64) -> Result<Self, NonPositiveDurationError> {
        let duration = i64::try_from(seconds).map_or(Duration::MAX, Duration::seconds);
        Self::try_from(duration)
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }

    /// The duration as whole seconds, the unit it is persisted in.
    #[must_use]
    pub fn whole_seconds(&self) -> i64 {
        self.0.whole_seconds()
    }

    #[must_use]
    pub fn to_std(&self) -> std::time::Duration {
        // Positive by construction.
        std::time::Duration::try_from(self.0).unwrap_or(std::time::Duration::MAX)
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::util::PositiveDuration;
    use time::Duration;

    #[test]
    fn only_positive_durations() {
        assert!(PositiveDuration::new(Duration::seconds(1)).is_some());
        assert!(PositiveDuration::new(Duration::ZERO).is_none());
        assert!(PositiveDuration::new(Duration::seconds(-5)).is_none());
        assert!(PositiveDuration::from_seconds(0).is_err());
    }

    #[test]
    fn converts_to_std() {
        let twenty = PositiveDuration::from_seconds(20).unwrap();
        assert_eq!(twenty.whole_seconds(), 20);
        assert_eq!(twenty.to_std(), std::time::Duration::from_secs(20));
    }
}
