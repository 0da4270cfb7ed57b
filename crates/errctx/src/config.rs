//! Registry configuration: pool sizing, storage retention and stack capture.

use crate::error::{Error, Result};

/// Environment variable overriding [`Config::prewarm`]
pub const ENV_PREWARM: &str = "NEBULA_ERRCTX_PREWARM";
/// Environment variable overriding [`Config::max_idle`]
pub const ENV_MAX_IDLE: &str = "NEBULA_ERRCTX_MAX_IDLE";
/// Environment variable overriding [`StackConfig::depth`] (`unbounded` or a number)
pub const ENV_STACK_DEPTH: &str = "NEBULA_ERRCTX_STACK_DEPTH";
/// Environment variable overriding [`StackConfig::skip`]
pub const ENV_STACK_SKIP: &str = "NEBULA_ERRCTX_STACK_SKIP";

/// How many frames a stack capture may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDepth {
    /// Record at most this many frames
    Bounded(usize),
    /// Record the whole stack
    Unbounded,
}

impl StackDepth {
    /// Upper bound on recorded frames, `None` when unbounded
    #[must_use]
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Bounded(n) => Some(n),
            Self::Unbounded => None,
        }
    }
}

/// Stack capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackConfig {
    /// Depth bound, applied after skipping and filtering
    pub depth: StackDepth,
    /// Frames dropped unconditionally from the top of every capture
    pub skip: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            depth: StackDepth::Bounded(32),
            skip: 0,
        }
    }
}

/// Capacity thresholds kept by a pooled instance across releases.
///
/// Storage that grew beyond these during an occurrence is shrunk back on
/// release; anything at or below is kept so that the next few-frame error
/// allocates nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Frame slots
    pub frames: usize,
    /// Field slots across all frames
    pub fields: usize,
    /// Bytes of message text
    pub text: usize,
    /// Captured stack entries
    pub stack: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            frames: 8,
            fields: 32,
            text: 1024,
            stack: 64,
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Instances allocated up front when the registry is built
    pub prewarm: usize,
    /// Maximum idle instances held by the pool; extra releases are dropped
    pub max_idle: usize,
    /// Storage kept per instance across releases
    pub retain: Retention,
    /// Stack capture settings
    pub stack: StackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prewarm: 64,
            max_idle: 256,
            retain: Retention::default(),
            stack: StackConfig::default(),
        }
    }
}

impl Config {
    /// Development configuration (deep stacks, small pool)
    #[must_use]
    pub fn development() -> Self {
        Self {
            prewarm: 8,
            max_idle: 64,
            stack: StackConfig {
                depth: StackDepth::Unbounded,
                ..StackConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (bounded stacks, larger warm pool)
    #[must_use]
    pub fn production() -> Self {
        Self {
            prewarm: 256,
            max_idle: 1024,
            stack: StackConfig {
                depth: StackDepth::Bounded(24),
                ..StackConfig::default()
            },
            ..Self::default()
        }
    }

    /// Default configuration overridden by `NEBULA_ERRCTX_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Default configuration overridden by values from `lookup`.
    ///
    /// `lookup` receives the variable names listed at the top of this module.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PREWARM) {
            config.prewarm = parse_count(ENV_PREWARM, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_IDLE) {
            config.max_idle = parse_count(ENV_MAX_IDLE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STACK_DEPTH) {
            config.stack.depth = if raw.trim().eq_ignore_ascii_case("unbounded") {
                StackDepth::Unbounded
            } else {
                StackDepth::Bounded(parse_count(ENV_STACK_DEPTH, &raw)?)
            };
        }
        if let Some(raw) = lookup(ENV_STACK_SKIP) {
            config.stack.skip = parse_count(ENV_STACK_SKIP, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_idle == 0 {
            return Err(Error::configuration("max_idle must be greater than 0"));
        }
        if self.prewarm > self.max_idle {
            return Err(Error::configuration(format!(
                "prewarm ({}) must not exceed max_idle ({})",
                self.prewarm, self.max_idle
            )));
        }
        if self.stack.depth == StackDepth::Bounded(0) {
            return Err(Error::configuration(
                "bounded stack depth must be greater than 0; use lightweight errors to skip capture",
            ));
        }
        Ok(())
    }
}

fn parse_count(var: &'static str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| Error::invalid_env(var, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::development().validate().is_ok());
        assert!(Config::production().validate().is_ok());
    }

    #[test]
    fn zero_max_idle_rejected() {
        let config = Config {
            prewarm: 0,
            max_idle: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn prewarm_above_max_idle_rejected() {
        let config = Config {
            prewarm: 10,
            max_idle: 4,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prewarm (10)"));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_PREWARM, "4"),
            (ENV_MAX_IDLE, " 16 "),
            (ENV_STACK_DEPTH, "Unbounded"),
            (ENV_STACK_SKIP, "2"),
        ]))
        .unwrap();

        assert_eq!(config.prewarm, 4);
        assert_eq!(config.max_idle, 16);
        assert_eq!(config.stack.depth, StackDepth::Unbounded);
        assert_eq!(config.stack.skip, 2);
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = Config::from_lookup(lookup_from(&[(ENV_STACK_DEPTH, "deep")])).unwrap_err();
        assert_eq!(err, Error::invalid_env(ENV_STACK_DEPTH, "deep"));
    }

    #[test]
    fn empty_lookup_yields_default() {
        assert_eq!(Config::from_lookup(|_| None).unwrap(), Config::default());
    }
}
