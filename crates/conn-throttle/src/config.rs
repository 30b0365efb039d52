//! Throttle policy configuration.
//!
//! A `ThrottleConfig` is both the policy a pool is built from and the key the
//! registry shares pools under: equal configs get the same pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ThrottleError;
use crate::permit::Permits;

/// Environment variable holding the connection limit (negative for unlimited).
pub const MAX_CONNECTIONS_VAR: &str = "THROTTLE_MAX_CONNECTIONS";

/// Environment variable holding the reset interval in milliseconds (0 disables).
pub const RESET_INTERVAL_VAR: &str = "THROTTLE_RESET_INTERVAL_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub capacity: Permits,
    /// Zero means no periodic reset.
    #[serde(rename = "reset_interval_ms", with = "millis")]
    pub reset_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            capacity: Permits::Unlimited,
            reset_interval: Duration::ZERO,
        }
    }
}

impl ThrottleConfig {
    pub fn new(capacity: Permits, reset_interval: Duration) -> Self {
        Self {
            capacity,
            reset_interval,
        }
    }

    pub fn with_capacity(mut self, capacity: Permits) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_reset_interval(mut self, reset_interval: Duration) -> Self {
        self.reset_interval = reset_interval;
        self
    }

    /// Load from `THROTTLE_MAX_CONNECTIONS` and `THROTTLE_RESET_INTERVAL_MS`.
    ///
    /// Unset variables keep their defaults (unlimited, no reset).
    pub fn from_env() -> Result<Self, ThrottleError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ThrottleError> {
        let mut config = Self::default();

        if let Some(value) = lookup(MAX_CONNECTIONS_VAR) {
            config.capacity = Permits::from(parse_int(MAX_CONNECTIONS_VAR, &value)?);
        }

        if let Some(value) = lookup(RESET_INTERVAL_VAR) {
            let ms = parse_int(RESET_INTERVAL_VAR, &value)?;
            config.reset_interval = Duration::from_millis(u64::try_from(ms).unwrap_or(0));
        }

        Ok(config)
    }
}

fn parse_int(var: &'static str, value: &str) -> Result<i64, ThrottleError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ThrottleError::InvalidConfig {
            var,
            value: value.to_string(),
        })
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Durations as whole milliseconds; negative input means zero.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::whole_millis(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn default_is_unlimited_without_reset() {
        let config = ThrottleConfig::default();
        assert_eq!(config.capacity, Permits::Unlimited);
        assert_eq!(config.reset_interval, Duration::ZERO);
    }

    #[test]
    fn builder_pattern() {
        let config = ThrottleConfig::default()
            .with_capacity(Permits::Limited(4))
            .with_reset_interval(Duration::from_secs(10));
        assert_eq!(
            config,
            ThrottleConfig::new(Permits::Limited(4), Duration::from_secs(10))
        );
    }

    #[test]
    fn equal_configs_hash_alike() {
        let a = ThrottleConfig::new(Permits::Limited(2), Duration::from_millis(500));
        let b = ThrottleConfig::new(Permits::Limited(2), Duration::from_millis(500));
        let c = ThrottleConfig::new(Permits::Limited(2), Duration::from_millis(501));

        let mut map = HashMap::new();
        map.insert(a, "a");
        assert_eq!(map.get(&b), Some(&"a"));
        assert_eq!(map.get(&c), None);
    }

    #[test]
    fn from_env_unset_uses_defaults() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ThrottleConfig::default());
    }

    #[test]
    fn from_env_reads_both_vars() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[
            (MAX_CONNECTIONS_VAR, "4"),
            (RESET_INTERVAL_VAR, " 2500 "),
        ]))
        .unwrap();
        assert_eq!(
            config,
            ThrottleConfig::new(Permits::Limited(4), Duration::from_millis(2500))
        );
    }

    #[test]
    fn from_env_negative_values() {
        let config = ThrottleConfig::from_lookup(lookup_from(&[
            (MAX_CONNECTIONS_VAR, "-1"),
            (RESET_INTERVAL_VAR, "-100"),
        ]))
        .unwrap();
        assert_eq!(config.capacity, Permits::Unlimited);
        assert_eq!(config.reset_interval, Duration::ZERO);
    }

    #[test]
    fn from_env_rejects_garbage() {
        let err =
            ThrottleConfig::from_lookup(lookup_from(&[(MAX_CONNECTIONS_VAR, "lots")])).unwrap_err();
        assert_eq!(
            err,
            ThrottleError::InvalidConfig {
                var: MAX_CONNECTIONS_VAR,
                value: "lots".to_string(),
            }
        );
    }

    #[test]
    fn serializes_bounded() {
        let config = ThrottleConfig::new(Permits::Limited(4), Duration::from_millis(2500));
        insta::assert_json_snapshot!(config, @r#"
        {
          "capacity": 4,
          "reset_interval_ms": 2500
        }
        "#);
    }

    #[test]
    fn serializes_unlimited() {
        insta::assert_json_snapshot!(ThrottleConfig::default(), @r#"
        {
          "capacity": -1,
          "reset_interval_ms": 0
        }
        "#);
    }

    #[test]
    fn whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_micros(2500)), 2);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn deserializes_transport_settings() {
        let config: ThrottleConfig =
            serde_json::from_str(r#"{"capacity": 0, "reset_interval_ms": -5}"#).unwrap();
        assert_eq!(config.capacity, Permits::Limited(0));
        assert_eq!(config.reset_interval, Duration::ZERO);
    }
}
