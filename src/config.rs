//! Process-wide configuration defaults.
//!
//! Views never consult these at query time; they copy the defaults into
//! their own explicit configuration when constructed. `init` exists so an
//! embedding binary can set policy once at startup.

use std::sync::OnceLock;

use crate::semiring::DELTA;

/// Default values copied into per-view configurations.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Check symbol-table compatibility at composition boundaries.
    pub compat_symbols: bool,
    /// Default quantization delta for approximate weight equality.
    pub delta: f32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            compat_symbols: true,
            delta: DELTA,
        }
    }
}

static GLOBAL: OnceLock<GlobalConfig> = OnceLock::new();

/// Installs the process-wide defaults. Returns `false` if defaults were
/// already installed or read, in which case nothing changes.
pub fn init(config: GlobalConfig) -> bool {
    GLOBAL.set(config).is_ok()
}

/// The process-wide defaults, installing the built-in values on first
/// use.
pub fn global() -> &'static GlobalConfig {
    GLOBAL.get_or_init(GlobalConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_defaults() {
        let config = global();
        assert!(config.compat_symbols);
        assert_eq!(config.delta, DELTA);
        // Once read, later installs are rejected.
        assert!(!init(GlobalConfig {
            compat_symbols: false,
            delta: 0.1,
        }));
    }
}
