//! JIT preferences.
//!
//! The emulator stores two JIT preferences: whether dynamic translation is
//! enabled at all and how large the translation cache is (in KB). They arrive
//! either as preference key/value pairs or through the environment.

use super::error::ConfigError;

/// Default translation cache size in KB.
pub const DEFAULT_CACHE_SIZE_KB: u32 = 2048;

const KEY_JIT: &str = "jit";
const KEY_CACHE_SIZE: &str = "jitcachesize";

const ENV_JIT: &str = "DYNGEN_JIT";
const ENV_CACHE_SIZE: &str = "DYNGEN_JIT_CACHE_SIZE";

/// JIT settings consumed by [`crate::codegen::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    /// Translate code at all. When false the interpreter runs alone.
    pub enabled: bool,
    /// Requested cache size in KB before guard and rounding.
    pub cache_size_kb: u32,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_size_kb: DEFAULT_CACHE_SIZE_KB,
        }
    }
}

impl JitConfig {
    /// Build a config from preference pairs, starting from the defaults.
    pub fn from_prefs<'a, I>(prefs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in prefs {
            config.apply(key, value)?;
        }
        Ok(config)
    }

    /// Build a config from `DYNGEN_JIT` and `DYNGEN_JIT_CACHE_SIZE`.
    ///
    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(ENV_JIT) {
            config.apply(KEY_JIT, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_CACHE_SIZE) {
            config.apply(KEY_CACHE_SIZE, &value)?;
        }
        Ok(config)
    }

    /// Apply a single preference.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            KEY_JIT => self.enabled = parse_bool(value).ok_or_else(invalid)?,
            KEY_CACHE_SIZE => self.cache_size_kb = value.trim().parse().map_err(|_| invalid())?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
