/// Scheduler tuning
use serde::{Deserialize, Serialize};

use crate::error::{positive_finite, Error, Result};

/// What happens to deliveries that were enqueued but not yet fired when
/// the scheduler stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Drop them; nothing fires after `stop()` returns.
    #[default]
    Discard,
    /// Let them fire; only the polling loop is cancelled.
    Deliver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How far ahead of the audio clock steps are committed, in seconds.
    pub lookahead: f64,
    /// Delay between scheduling passes, in seconds.
    pub poll_interval: f64,
    /// 4 = sixteenth notes.
    pub steps_per_beat: u32,
    pub on_stop: PendingPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            poll_interval: 0.025,
            steps_per_beat: 4,
            on_stop: PendingPolicy::Discard,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        positive_finite("lookahead", self.lookahead)?;
        positive_finite("poll_interval", self.poll_interval)?;
        if self.steps_per_beat == 0 {
            return Err(Error::InvalidArgument(
                "steps_per_beat must be at least 1".to_string(),
            ));
        }
        // A window no wider than the poll period lets jitter skip steps.
        if self.lookahead <= self.poll_interval {
            return Err(Error::InvalidArgument(format!(
                "lookahead ({}s) must exceed poll_interval ({}s)",
                self.lookahead, self.poll_interval
            )));
        }
        Ok(())
    }

    pub fn with_lookahead(mut self, seconds: f64) -> Self {
        self.lookahead = seconds;
        self
    }

    pub fn with_poll_interval(mut self, seconds: f64) -> Self {
        self.poll_interval = seconds;
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.on_stop = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert_eq!(config.lookahead, 0.1);
        assert_eq!(config.poll_interval, 0.025);
        assert_eq!(config.steps_per_beat, 4);
        assert_eq!(config.on_stop, PendingPolicy::Discard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_narrow_lookahead() {
        let config = SchedulerConfig::default()
            .with_lookahead(0.02)
            .with_poll_interval(0.025);
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(SchedulerConfig::default()
            .with_poll_interval(0.0)
            .validate()
            .is_err());
        let config = SchedulerConfig {
            steps_per_beat: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "lookahead": 0.2, "on_stop": "deliver" }"#).unwrap();
        assert_eq!(config.lookahead, 0.2);
        assert_eq!(config.poll_interval, 0.025);
        assert_eq!(config.on_stop, PendingPolicy::Deliver);
    }
}
