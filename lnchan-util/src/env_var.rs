use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use lnchan::config::EngineConfig;
use log::info;

pub const ENV_FUNDING_DEPTH: &str = "LNCHAN_FUNDING_DEPTH";
pub const ENV_SAFETY_DEPTH: &str = "LNCHAN_SAFETY_DEPTH";
pub const ENV_EVENT_CAPACITY: &str = "LNCHAN_EVENT_CAPACITY";
pub const ENV_FOLLOWER_INTERVAL_MS: &str = "LNCHAN_FOLLOWER_INTERVAL_MS";
pub const ENV_AUTO_PRUNE: &str = "LNCHAN_AUTO_PRUNE";

fn override_from<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(s) = lookup(key) {
        *target = s.trim().parse().map_err(|e| anyhow!("{}", e)).with_context(|| {
            format!("{}={} is not a valid value", key, s)
        })?;
        info!("{} override: {}", key, s);
    }
    Ok(())
}

/// Apply `LNCHAN_*` overrides found by `lookup`
pub fn apply_overrides_from<F>(mut config: EngineConfig, lookup: F) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    override_from(&lookup, ENV_FUNDING_DEPTH, &mut config.funding_depth)?;
    override_from(&lookup, ENV_SAFETY_DEPTH, &mut config.safety_depth)?;
    override_from(&lookup, ENV_EVENT_CAPACITY, &mut config.event_capacity)?;
    override_from(&lookup, ENV_FOLLOWER_INTERVAL_MS, &mut config.follower_interval_ms)?;
    override_from(&lookup, ENV_AUTO_PRUNE, &mut config.auto_prune)?;
    Ok(config)
}

/// Apply `LNCHAN_*` overrides from the process environment
pub fn apply_env_overrides(config: EngineConfig) -> Result<EngineConfig> {
    apply_overrides_from(config, |key| env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_test() {
        let vars: HashMap<&str, &str> =
            [(ENV_SAFETY_DEPTH, "100"), (ENV_AUTO_PRUNE, "false")].into_iter().collect();
        let config =
            apply_overrides_from(EngineConfig::default(), |k| vars.get(k).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.safety_depth, 100);
        assert!(!config.auto_prune);
        assert_eq!(config.funding_depth, EngineConfig::default().funding_depth);
    }

    #[test]
    fn bad_override_test() {
        let err = apply_overrides_from(EngineConfig::default(), |k| {
            (k == ENV_FUNDING_DEPTH).then(|| "three".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_FUNDING_DEPTH));
    }
}
