//! Engine configuration: poll interval and per-kind operation timeouts.

use std::time::Duration;

use crate::waiter::{Operation, WaitConfig};

/// Default interval between status probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on each long-running operation, per verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Settings shared by every reconciler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Overrides the kind's default timeouts when set.
    pub timeouts: Option<Timeouts>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeouts: None,
        }
    }
}

impl EngineConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Wait settings for one operation of a kind with the given defaults.
    pub fn wait_config(&self, operation: Operation, kind_defaults: Timeouts) -> WaitConfig {
        let timeouts = self.timeouts.unwrap_or(kind_defaults);
        WaitConfig {
            interval: self.poll_interval,
            timeout: timeouts.for_operation(operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_kind_defaults() {
        let defaults = Timeouts {
            create: Duration::from_secs(300),
            update: Duration::from_secs(120),
            delete: Duration::from_secs(60),
        };

        let config = EngineConfig::default();
        assert_eq!(
            config.wait_config(Operation::Update, defaults).timeout,
            Duration::from_secs(120)
        );

        let config = EngineConfig::default()
            .with_poll_interval(Duration::from_secs(1))
            .with_timeouts(Timeouts::uniform(Duration::from_secs(10)));
        let wait = config.wait_config(Operation::Create, defaults);
        assert_eq!(wait.timeout, Duration::from_secs(10));
        assert_eq!(wait.interval, Duration::from_secs(1));
    }
}
