//! Configuration builder trait

use crate::Result;

/// Common shape for configuration structures.
///
/// Layering is explicit: a caller starts from one source and merges the
/// next source over it. `merge` lets values present in `other` win.
pub trait ConfigBuilder: Default + Clone {
    /// Check ranges and cross-field constraints.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load only the fields present in the environment under `prefix`.
    ///
    /// Fields with no variable set keep their `Default` value.
    fn from_env(prefix: &str) -> Result<Self>;

    /// Overlay `other` onto `self`.
    fn merge(&mut self, other: Self) -> &mut Self;

    /// Default configuration, validated.
    fn build() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Overlay the environment onto `base`, then validate.
    fn layered(base: Self, prefix: &str) -> Result<Self> {
        let mut config = base;
        config.merge(Self::from_env(prefix)?);
        config.validate()?;
        Ok(config)
    }
}
