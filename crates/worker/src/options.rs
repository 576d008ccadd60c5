//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do with the popped job after the connection had to be reopened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Treat the repair as the whole iteration: hand a pending job back to the
    /// queue without running it.
    #[default]
    SkipIteration,
    /// Clear the session and run the job on the fresh connection.
    Continue,
}

impl FromStr for ReconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip_iteration" | "skip" => Ok(Self::SkipIteration),
            "continue" => Ok(Self::Continue),
            other => Err(format!("expected `skip_iteration` or `continue`, got `{other}`")),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Immutable per-invocation worker configuration.
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Queue connection name.
    pub connection: String,
    /// Queue name; several names may be listed, comma-separated, in priority order.
    pub queue: String,
    /// Pause between polls when no job is available (or during maintenance).
    #[serde(with = "secs")]
    pub sleep: Duration,
    /// Stop the daemon once the memory gauge reaches this many megabytes (0 = unlimited).
    pub memory_limit_mb: u64,
    /// Soft limit on a single job's run time; overruns are logged (0 = none).
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// Delay applied when a job is released back onto its queue.
    #[serde(with = "secs")]
    pub delay: Duration,
    /// Attempts allowed before a job is failed (0 = unlimited).
    pub max_tries: u32,
    /// Stop the daemon as soon as the queue is empty.
    pub stop_when_empty: bool,
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            connection: "default".to_string(),
            queue: "default".to_string(),
            sleep: Duration::from_secs(3),
            memory_limit_mb: 128,
            timeout: Duration::from_secs(60),
            delay: Duration::ZERO,
            max_tries: 0,
            stop_when_empty: false,
            reconnect_policy: ReconnectPolicy::SkipIteration,
        }
    }
}

impl WorkerOptions {
    pub const CONNECTION_ENV: &'static str = "JOBGUARD_CONNECTION";
    pub const QUEUE_ENV: &'static str = "JOBGUARD_QUEUE";
    pub const SLEEP_ENV: &'static str = "JOBGUARD_SLEEP";
    pub const MEMORY_ENV: &'static str = "JOBGUARD_MEMORY_MB";
    pub const TIMEOUT_ENV: &'static str = "JOBGUARD_TIMEOUT";
    pub const DELAY_ENV: &'static str = "JOBGUARD_DELAY";
    pub const MAX_TRIES_ENV: &'static str = "JOBGUARD_MAX_TRIES";
    pub const STOP_WHEN_EMPTY_ENV: &'static str = "JOBGUARD_STOP_WHEN_EMPTY";
    pub const RECONNECT_POLICY_ENV: &'static str = "JOBGUARD_RECONNECT_POLICY";

    /// Load options from `JOBGUARD_*` environment variables.
    ///
    /// Unset variables keep their default; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load options through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(v) = lookup(Self::CONNECTION_ENV) {
            opts.connection = v;
        }
        if let Some(v) = lookup(Self::QUEUE_ENV) {
            opts.queue = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, Self::SLEEP_ENV)? {
            opts.sleep = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, Self::MEMORY_ENV)? {
            opts.memory_limit_mb = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, Self::TIMEOUT_ENV)? {
            opts.timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, Self::DELAY_ENV)? {
            opts.delay = Duration::from_secs(v);
        }
        if let Some(v) = parse_var(&lookup, Self::MAX_TRIES_ENV)? {
            opts.max_tries = v;
        }
        if let Some(v) = parse_var(&lookup, Self::STOP_WHEN_EMPTY_ENV)? {
            opts.stop_when_empty = v;
        }
        if let Some(v) = parse_var(&lookup, Self::RECONNECT_POLICY_ENV)? {
            opts.reconnect_policy = v;
        }

        Ok(opts)
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    pub fn with_stop_when_empty(mut self, stop: bool) -> Self {
        self.stop_when_empty = stop;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let opts = WorkerOptions::from_lookup(lookup(&[])).unwrap();
        assert_eq!(opts, WorkerOptions::default());
        assert_eq!(opts.sleep, Duration::from_secs(3));
        assert_eq!(opts.reconnect_policy, ReconnectPolicy::SkipIteration);
    }

    #[test]
    fn environment_overrides_defaults() {
        let opts = WorkerOptions::from_lookup(lookup(&[
            ("JOBGUARD_QUEUE", "high,default"),
            ("JOBGUARD_DELAY", "30"),
            ("JOBGUARD_MAX_TRIES", " 3 "),
            ("JOBGUARD_STOP_WHEN_EMPTY", "true"),
            ("JOBGUARD_RECONNECT_POLICY", "continue"),
        ]))
        .unwrap();

        assert_eq!(opts.queue, "high,default");
        assert_eq!(opts.delay, Duration::from_secs(30));
        assert_eq!(opts.max_tries, 3);
        assert!(opts.stop_when_empty);
        assert_eq!(opts.reconnect_policy, ReconnectPolicy::Continue);
        assert_eq!(opts.connection, "default");
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = WorkerOptions::from_lookup(lookup(&[("JOBGUARD_SLEEP", "soon")])).unwrap_err();
        match err {
            ConfigError::Invalid { var, value, .. } => {
                assert_eq!(var, "JOBGUARD_SLEEP");
                assert_eq!(value, "soon");
            }
        }

        let err = WorkerOptions::from_lookup(lookup(&[("JOBGUARD_RECONNECT_POLICY", "retry")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOBGUARD_RECONNECT_POLICY"));
    }

    #[test]
    fn deserializes_seconds_and_fills_missing_fields() {
        let opts: WorkerOptions = serde_json::from_str(
            r#"{"queue":"mail","sleep":0,"delay":10,"reconnect_policy":"continue"}"#,
        )
        .unwrap();

        assert_eq!(opts.queue, "mail");
        assert_eq!(opts.sleep, Duration::ZERO);
        assert_eq!(opts.delay, Duration::from_secs(10));
        assert_eq!(opts.timeout, Duration::from_secs(60));
        assert_eq!(opts.reconnect_policy, ReconnectPolicy::Continue);
    }

    #[test]
    fn serializes_durations_as_seconds() {
        let json = serde_json::to_value(WorkerOptions::default().with_delay(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(json["delay"], 5);
        assert_eq!(json["reconnect_policy"], "skip_iteration");
    }
}
