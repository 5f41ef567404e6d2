//! Discovery tuning knobs
//!
//! ## Example
//!
//! ```ignore
//! use typescout_core::config::DiscoveryConfig;
//!
//! let config = DiscoveryConfig::builder()
//!     .object_class_threshold(75)
//!     .world_reread_delay_ms(100)
//!     .build();
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discover::agreement::Threshold;
use crate::error::Result;
use crate::sections::{CODE_SECTION, DATA_SECTION};

/// Agreement percentages each discoverer must strictly exceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub object_class: Threshold,
    pub object_index: Threshold,
    pub object_name: Threshold,
    pub object_outer: Threshold,
    pub struct_children: Threshold,
    pub function_flags: Threshold,
    pub function_exec: Threshold,
    pub cast_flags_nonzero: Threshold,
    pub default_object: Threshold,
    pub typed_pointer: Threshold,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            object_class: Threshold::percent(80),
            object_index: Threshold::percent(50),
            object_name: Threshold::percent(60),
            object_outer: Threshold::percent(70),
            struct_children: Threshold::percent(80),
            function_flags: Threshold::percent(70),
            function_exec: Threshold::percent(70),
            cast_flags_nonzero: Threshold::percent(40),
            default_object: Threshold::percent(50),
            typed_pointer: Threshold::percent(50),
        }
    }
}

/// Sample sizes: how many records to gather, how far to scan for them, and the
/// minimum below which a discoverer gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleLimits {
    pub base_records: usize,
    pub base_minimum: usize,
    /// Leading samples checked for the self-index field
    pub index_window: usize,
    /// Leading samples checked for the name field
    pub name_window: usize,
    pub class_records: usize,
    pub class_scan: usize,
    pub class_minimum: usize,
    pub children_records: usize,
    pub children_minimum: usize,
    pub function_records: usize,
    pub function_scan: usize,
    pub function_minimum: usize,
    pub native_records: usize,
    pub native_minimum: usize,
    /// Object slots walked when looking for typed field descriptors
    pub property_scan: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            base_records: 500,
            base_minimum: 10,
            index_window: 100,
            name_window: 50,
            class_records: 30,
            class_scan: 2000,
            class_minimum: 5,
            children_records: 50,
            children_minimum: 11,
            function_records: 30,
            function_scan: 5000,
            function_minimum: 5,
            native_records: 20,
            native_minimum: 3,
            property_scan: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub thresholds: Thresholds,
    pub samples: SampleLimits,
    /// Pause before re-reading an ambiguous world pointer candidate
    pub world_reread_delay_ms: u64,
    pub max_chain_depth: usize,
    pub data_section: String,
    pub code_section: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            samples: SampleLimits::default(),
            world_reread_delay_ms: 50,
            max_chain_depth: crate::memory::layout::walk::MAX_DEPTH,
            data_section: DATA_SECTION.to_string(),
            code_section: CODE_SECTION.to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Create a new configuration builder
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::default()
    }

    pub fn world_reread_delay(&self) -> Duration {
        Duration::from_millis(self.world_reread_delay_ms)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Builder for DiscoveryConfig
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfigBuilder {
    thresholds: Option<Thresholds>,
    samples: Option<SampleLimits>,
    object_class_threshold: Option<u32>,
    world_reread_delay_ms: Option<u64>,
    max_chain_depth: Option<usize>,
    data_section: Option<String>,
    code_section: Option<String>,
}

impl DiscoveryConfigBuilder {
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn samples(mut self, samples: SampleLimits) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Override only the declared-type agreement bar
    pub fn object_class_threshold(mut self, percent: u32) -> Self {
        self.object_class_threshold = Some(percent);
        self
    }

    pub fn world_reread_delay_ms(mut self, millis: u64) -> Self {
        self.world_reread_delay_ms = Some(millis);
        self
    }

    pub fn max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = Some(depth);
        self
    }

    /// Set the section scanned for root anchors
    pub fn data_section<S: Into<String>>(mut self, name: S) -> Self {
        self.data_section = Some(name.into());
        self
    }

    /// Set the section scanned for code patterns
    pub fn code_section<S: Into<String>>(mut self, name: S) -> Self {
        self.code_section = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> DiscoveryConfig {
        let default = DiscoveryConfig::default();
        let mut thresholds = self.thresholds.unwrap_or(default.thresholds);
        if let Some(percent) = self.object_class_threshold {
            thresholds.object_class = Threshold::percent(percent);
        }
        DiscoveryConfig {
            thresholds,
            samples: self.samples.unwrap_or(default.samples),
            world_reread_delay_ms: self
                .world_reread_delay_ms
                .unwrap_or(default.world_reread_delay_ms),
            max_chain_depth: self.max_chain_depth.unwrap_or(default.max_chain_depth),
            data_section: self.data_section.unwrap_or(default.data_section),
            code_section: self.code_section.unwrap_or(default.code_section),
        }
    }
}
