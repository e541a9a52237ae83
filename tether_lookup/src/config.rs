// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lookup and world configuration.

use serde::{Deserialize, Serialize};
use tether_xform::GraphConfig;
use thiserror::Error;

/// Errors loading a [`SpatialConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Broadphase tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Margin added around every proxy's tight box.
    pub fat_margin: f64,

    /// Scale applied to a move's displacement when stretching the fattened box.
    pub displacement_multiplier: f64,

    /// Half extent of the box used for entities with no registered shape.
    pub sundry_half_extent: f64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            fat_margin: 0.1,
            displacement_multiplier: 4.0,
            sundry_half_extent: 0.05,
        }
    }
}

impl LookupConfig {
    /// Tight bounds everywhere: no margin and no predictive stretch.
    ///
    /// Useful in tests where approximate and exact queries should agree.
    pub fn tight() -> Self {
        Self {
            fat_margin: 0.0,
            displacement_multiplier: 0.0,
            ..Default::default()
        }
    }

    /// Reject negative or non-finite values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("fat_margin", self.fat_margin),
            ("displacement_multiplier", self.displacement_multiplier),
            ("sundry_half_extent", self.sundry_half_extent),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be finite and non-negative",
                });
            }
        }
        Ok(())
    }
}

/// Configuration of a whole [`SpatialWorld`](crate::SpatialWorld).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Transform graph settings.
    pub graph: GraphConfig,
    /// Broadphase settings.
    pub lookup: LookupConfig,
}

impl SpatialConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.lookup.validate()?;
        if !config.graph.position_epsilon.is_finite() || config.graph.position_epsilon < 0.0 {
            return Err(ConfigError::Invalid {
                field: "graph.position_epsilon",
                reason: "must be finite and non-negative",
            });
        }
        if !config.graph.rotation_epsilon.is_finite() || config.graph.rotation_epsilon < 0.0 {
            return Err(ConfigError::Invalid {
                field: "graph.rotation_epsilon",
                reason: "must be finite and non-negative",
            });
        }
        Ok(config)
    }
}
