//! Engine configuration.
//!
//! This module defines the settings that are not part of a workload's shape:
//! 1. **Defaults:** Baseline constants (line size, batch size, loop count, seed).
//! 2. **Structure:** [`EngineConfig`], deserialized from JSON with per-field defaults.
//! 3. **Validation:** Range checks applied before any workload is built.
//!
//! Configuration is supplied as JSON (`EngineConfig::from_json`) or built with
//! `EngineConfig::default()`. Verbosity is part of the configuration; nothing
//! is read from process-wide state.

use serde::Deserialize;

use crate::common::constants::{LINE_GRANULE, MAX_LINE_SIZE, MAX_LOOP_COUNT};
use crate::common::{Error, Result};
use crate::isa::Isa;

/// Default configuration constants for the engine.
mod defaults {
    /// Cache line size in bytes.
    ///
    /// Code lines and data chunks are both multiples of this size.
    pub const LINE_SIZE: usize = 64;

    /// Calls of the entry point between two cancellation checks.
    pub const BATCH: u32 = 16;

    /// Seed of the chain permutation.
    pub const SEED: u64 = 0x5EED_C0DE_2718_2818;

    /// Inner-loop trip count used when a characteristic asks for automatic looping.
    pub const AUTO_LOOP_COUNT: u32 = 1000;

    /// Extra code lines reserved for the prologue, epilogue and loop tail.
    pub const PROLOGUE_SLACK_LINES: usize = 8;

    /// Upper bound on the batch size.
    pub const MAX_BATCH: u32 = 1 << 20;
}

/// Engine-wide settings.
///
/// # Examples
///
/// ```
/// use synthload_core::config::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "line_size": 128, "verbose": true }"#).unwrap();
/// assert_eq!(config.line_size, 128);
/// assert_eq!(config.batch, 16);
/// assert!(config.verbose);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Cache line size in bytes; multiple of 32.
    #[serde(default = "EngineConfig::default_line_size")]
    pub line_size: usize,

    /// Target instruction set; the host when absent.
    #[serde(default)]
    pub isa: Option<Isa>,

    /// Entry-point calls per worker batch.
    #[serde(default = "EngineConfig::default_batch")]
    pub batch: u32,

    /// Seed of the chain permutation.
    #[serde(default = "EngineConfig::default_seed")]
    pub seed: u64,

    /// Announce every built image to an attached debugger.
    #[serde(default)]
    pub register_debugger: bool,

    /// Re-walk every chain after construction.
    #[serde(default = "EngineConfig::default_verify_chain")]
    pub verify_chain: bool,

    /// Trace inter-line branches and other per-instruction events.
    #[serde(default)]
    pub verbose: bool,

    /// Trip count used when `loop_count` is zero.
    #[serde(default = "EngineConfig::default_auto_loop_count")]
    pub auto_loop_count: u32,

    /// Code lines added to the body footprint for fixed sequences.
    #[serde(default = "EngineConfig::default_prologue_slack_lines")]
    pub prologue_slack_lines: usize,
}

impl EngineConfig {
    /// Returns the default line size.
    fn default_line_size() -> usize {
        defaults::LINE_SIZE
    }

    /// Returns the default batch size.
    fn default_batch() -> u32 {
        defaults::BATCH
    }

    /// Returns the default seed.
    fn default_seed() -> u64 {
        defaults::SEED
    }

    /// Chains are verified unless explicitly disabled.
    fn default_verify_chain() -> bool {
        true
    }

    /// Returns the default automatic loop count.
    fn default_auto_loop_count() -> u32 {
        defaults::AUTO_LOOP_COUNT
    }

    /// Returns the default number of slack lines.
    fn default_prologue_slack_lines() -> usize {
        defaults::PROLOGUE_SLACK_LINES
    }

    /// Parses and validates a JSON configuration object.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.line_size < LINE_GRANULE || self.line_size % LINE_GRANULE != 0 {
            return Err(Error::invalid(
                "line_size",
                format!("{} is not a positive multiple of {LINE_GRANULE}", self.line_size),
            ));
        }
        if self.line_size > MAX_LINE_SIZE {
            return Err(Error::invalid(
                "line_size",
                format!("{} exceeds {MAX_LINE_SIZE}", self.line_size),
            ));
        }
        if self.batch == 0 || self.batch > defaults::MAX_BATCH {
            return Err(Error::invalid(
                "batch",
                format!("{} is outside 1..={}", self.batch, defaults::MAX_BATCH),
            ));
        }
        if self.auto_loop_count == 0 || self.auto_loop_count > MAX_LOOP_COUNT {
            return Err(Error::invalid(
                "auto_loop_count",
                format!("{} is outside 1..={MAX_LOOP_COUNT}", self.auto_loop_count),
            ));
        }
        if self.prologue_slack_lines == 0 {
            return Err(Error::invalid("prologue_slack_lines", "must be at least 1"));
        }
        Ok(())
    }

    /// Resolves the target instruction set.
    ///
    /// # Returns
    ///
    /// The configured target, else the host, else [`Error::Validation`] on a
    /// host the engine cannot generate code for.
    pub fn target_isa(&self) -> Result<Isa> {
        self.isa
            .or_else(Isa::host)
            .ok_or_else(|| Error::invalid("isa", "host architecture has no encoder; set `isa`"))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            line_size: defaults::LINE_SIZE,
            isa: None,
            batch: defaults::BATCH,
            seed: defaults::SEED,
            register_debugger: false,
            verify_chain: true,
            verbose: false,
            auto_loop_count: defaults::AUTO_LOOP_COUNT,
            prologue_slack_lines: defaults::PROLOGUE_SLACK_LINES,
        }
    }
}
