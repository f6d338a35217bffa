//! Registry configuration.

use crate::error::ConfigError;

/// Smallest slot count an index may have.
pub const MIN_INDEX_SLOTS: usize = 4;

/// Configuration for a [`FrameRegistry`](crate::FrameRegistry).
///
/// # Example
///
/// ```
/// use frametable::RegistryConfig;
///
/// // Pre-size the index for a large static image.
/// let config = RegistryConfig {
///     min_slots: 1 << 16,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Lower bound on the index slot count.
    ///
    /// The index always has at least twice as many slots as descriptors;
    /// raising this bound trades memory for shorter probes on small images.
    ///
    /// Default: 4
    pub min_slots: usize,

    /// Check tables for producer contract violations on every rebuild.
    ///
    /// Reports return addresses below 4096 and duplicate return addresses
    /// across tables. Findings are logged, never rejected.
    ///
    /// Default: false (enabled in debug builds)
    pub verify_tables: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_slots: MIN_INDEX_SLOTS,
            verify_tables: cfg!(debug_assertions),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration that verifies every rebuild.
    pub fn verifying() -> Self {
        Self {
            verify_tables: true,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_slots < MIN_INDEX_SLOTS || !self.min_slots.is_power_of_two() {
            return Err(ConfigError::InvalidMinSlots(self.min_slots));
        }
        Ok(())
    }
}
