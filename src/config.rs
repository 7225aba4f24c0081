//! Runtime configuration.
//!
//! One [`RuntimeConfig`] per thread. Defaults suit interactive use; tests
//! and tooling override them with [`set_runtime_config`] or from the
//! environment with [`RuntimeConfig::from_env`].

use std::cell::RefCell;

use tracing::warn;

use crate::devtools;
use crate::scheduler::ScheduleMode;

/// Knobs read by the scheduler and the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Mode used for builds scheduled by state changes.
    pub default_mode: ScheduleMode,
    /// Nodes an async build captures before yielding to the scheduler.
    pub slice_budget: usize,
    /// Builds a single flush may run before it is treated as an update loop.
    pub max_nested_builds: usize,
    /// Whether an attached devtools hook receives events.
    pub devtools: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_mode: ScheduleMode::Async,
            slice_budget: 64,
            max_nested_builds: 50,
            devtools: true,
        }
    }
}

impl RuntimeConfig {
    /// Read overrides from `SPARK_DOM_MODE` (`sync` | `async`),
    /// `SPARK_DOM_SLICE_BUDGET` and `SPARK_DOM_MAX_NESTED_BUILDS`.
    ///
    /// Unset variables keep the default; malformed ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(mode) = lookup("SPARK_DOM_MODE") {
            match mode.trim().to_lowercase().as_str() {
                "sync" => config.default_mode = ScheduleMode::Sync,
                "async" => config.default_mode = ScheduleMode::Async,
                other => warn!(value = other, "ignoring SPARK_DOM_MODE"),
            }
        }
        if let Some(budget) = lookup("SPARK_DOM_SLICE_BUDGET") {
            match budget.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.slice_budget = n,
                _ => warn!(value = %budget, "ignoring SPARK_DOM_SLICE_BUDGET"),
            }
        }
        if let Some(max) = lookup("SPARK_DOM_MAX_NESTED_BUILDS") {
            match max.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_nested_builds = n,
                _ => warn!(value = %max, "ignoring SPARK_DOM_MAX_NESTED_BUILDS"),
            }
        }
        config
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

pub fn runtime_config() -> RuntimeConfig {
    CONFIG.with(|c| c.borrow().clone())
}

pub fn set_runtime_config(config: RuntimeConfig) {
    devtools::set_allowed(config.devtools);
    CONFIG.with(|c| *c.borrow_mut() = config);
}

pub fn update_runtime_config(f: impl FnOnce(&mut RuntimeConfig)) {
    let devtools = CONFIG.with(|c| {
        let mut config = c.borrow_mut();
        f(&mut config);
        config.devtools
    });
    devtools::set_allowed(devtools);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_mode, ScheduleMode::Async);
        assert!(config.slice_budget > 0);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = RuntimeConfig::from_lookup(|name| match name {
            "SPARK_DOM_MODE" => Some("SYNC".into()),
            "SPARK_DOM_SLICE_BUDGET" => Some("8".into()),
            "SPARK_DOM_MAX_NESTED_BUILDS" => Some("zero".into()),
            _ => None,
        });
        assert_eq!(config.default_mode, ScheduleMode::Sync);
        assert_eq!(config.slice_budget, 8);
        assert_eq!(config.max_nested_builds, RuntimeConfig::default().max_nested_builds);
    }

    #[test]
    fn test_update_in_place() {
        update_runtime_config(|c| c.slice_budget = 3);
        assert_eq!(runtime_config().slice_budget, 3);
        set_runtime_config(RuntimeConfig::default());
    }
}
