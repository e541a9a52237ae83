// Copyright 2025 the Tether Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transform graph configuration.

use serde::{Deserialize, Serialize};

/// How structural errors that can be recovered from are handled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Cycles outside of state replay fail the mutation.
    #[default]
    Strict,
    /// Cycles are always broken by detaching the offending ancestor, with a warning.
    Tolerant,
}

/// Transform graph configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Policy at recoverable error sites.
    pub error_policy: ErrorPolicy,

    /// Positions closer than this are considered unchanged.
    pub position_epsilon: f64,

    /// Rotations closer than this (in radians) are considered unchanged.
    pub rotation_epsilon: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Strict,
            position_epsilon: 1e-7,
            rotation_epsilon: 1e-7,
        }
    }
}

impl GraphConfig {
    /// Configuration for client-side replicas, which see transient cycles
    /// while catching up with authoritative state.
    pub fn tolerant() -> Self {
        Self {
            error_policy: ErrorPolicy::Tolerant,
            ..Default::default()
        }
    }
}
