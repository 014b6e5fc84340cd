//! Workload characteristics.
//!
//! A [`Characteristic`] is the complete shape of a workload: how much code it
//! executes, how much data it touches and how, and what floating-point work is
//! interleaved with the memory references. It is parsed from a flat JSON
//! object; missing keys take their defaults and unknown keys are ignored.

use serde::{Deserialize, Serialize};

use crate::common::constants::{
    MAX_DATA_FOOTPRINT, MAX_INST_FOOTPRINT, MAX_LOOP_COUNT, MIN_SLOT_SPAN, POINTER_SIZE,
};
use crate::common::{Error, Result};
use crate::isa::{FpKind, MemFlags, Precision, Width};

/// Upper bound on FP operations per memory reference.
pub const MAX_FP_INTENSITY: u32 = 4096;

/// Upper bound on independent FP dependency chains.
pub const MAX_CONCURRENCY: u32 = 64;

/// Upper bound on lines per chunk.
pub const MAX_DISPERSION: usize = 4096;

/// Shape of a synthetic workload.
///
/// # Examples
///
/// ```
/// use synthload_core::Characteristic;
///
/// let c = Characteristic::from_json(
///     r#"{ "data_footprint": 1048576, "fp_intensity": 2, "operation": "fmadd", "store": true }"#,
/// )
/// .unwrap();
/// assert_eq!(c.dispersion, 1);
/// assert!(c.store);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Characteristic {
    /// Bytes of generated body code.
    pub inst_footprint: usize,
    /// Bytes of pointer-chase working set, before dispersion.
    pub data_footprint: usize,
    /// Offset from the chain pointer of the store access.
    pub data_offset: usize,
    /// Cache lines per chunk.
    pub dispersion: usize,
    /// Alignment of the chain pointer inside its chunk.
    pub alignment: usize,
    /// FP operations per memory reference.
    pub fp_intensity: u32,
    /// FP element precision.
    pub precision: Precision,
    /// FP operation kind.
    pub operation: FpKind,
    /// SIMD width in bits (0 for scalar).
    pub simd_width: Width,
    /// Independent FP dependency chains.
    pub concurrency: u32,
    /// Inner loop trip count; 0 selects the engine default.
    pub loop_count: u32,
    /// Store the value register behind every chain pointer.
    pub store: bool,
    /// Use non-temporal forms.
    pub non_temporal: bool,
    /// Prefetch one line ahead of the cursor.
    pub prefetch: bool,
    /// Use paired (two-register) accesses.
    pub paired: bool,
    /// Load-acquire the chain pointer.
    pub acquire: bool,
    /// Store-release the value.
    pub release: bool,
    /// Make the store an atomic add.
    pub atomic: bool,
    /// Full barrier after every memory reference.
    pub barrier: bool,
    /// Link chunks sequentially instead of randomly.
    pub streaming: bool,
    /// Request transparent huge pages for the data region.
    pub huge_pages: bool,
    /// Use extension encodings (VEX, FP16, LSE, Zfh).
    pub alternate_form: bool,
    /// Bracket the body with trace markers.
    pub trace_markers: bool,
}

impl Default for Characteristic {
    fn default() -> Self {
        Self {
            inst_footprint: 0,
            data_footprint: 0,
            data_offset: POINTER_SIZE,
            dispersion: 1,
            alignment: POINTER_SIZE,
            fp_intensity: 0,
            precision: Precision::Double,
            operation: FpKind::Add,
            simd_width: Width::Scalar,
            concurrency: 1,
            loop_count: 0,
            store: false,
            non_temporal: false,
            prefetch: false,
            paired: false,
            acquire: false,
            release: false,
            atomic: false,
            barrier: false,
            streaming: false,
            huge_pages: false,
            alternate_form: false,
            trace_markers: false,
        }
    }
}

impl Characteristic {
    /// Parses a flat JSON object and checks the line-independent ranges.
    pub fn from_json(json: &str) -> Result<Self> {
        let characteristic: Self = serde_json::from_str(json)?;
        characteristic.validate_fields()?;
        Ok(characteristic)
    }

    /// Converts an already parsed JSON value and checks the line-independent ranges.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let characteristic: Self = serde_json::from_value(value)?;
        characteristic.validate_fields()?;
        Ok(characteristic)
    }

    /// Returns `true` if a data region is built.
    pub const fn has_data(&self) -> bool {
        self.data_footprint > 0
    }

    /// Returns `true` if the code generator runs (otherwise a fixed stub is used).
    pub const fn has_code(&self) -> bool {
        self.inst_footprint > 0 || self.fp_intensity > 0
    }

    /// Chunk size for `line`-byte lines.
    pub const fn chunk(&self, line: usize) -> usize {
        line * self.dispersion
    }

    /// Bytes each chain slot reserves from its pointer onward.
    ///
    /// Covers the pointer, the paired load and the secondary store.
    pub const fn slot_span(&self) -> usize {
        let behind_store = self.data_offset + self.store_bytes();
        if behind_store > MIN_SLOT_SPAN { behind_store } else { MIN_SLOT_SPAN }
    }

    /// Widest write the secondary store may encode to.
    ///
    /// Paired and non-temporal stores write two registers on the targets
    /// that support them (`stp`, `stnp`).
    pub const fn store_bytes(&self) -> usize {
        let flags = self.store_flags();
        if flags.paired || flags.non_temporal { 2 * POINTER_SIZE } else { POINTER_SIZE }
    }

    /// Memory-access modifiers of the chain load.
    pub const fn load_flags(&self) -> MemFlags {
        MemFlags {
            non_temporal: self.non_temporal,
            paired: self.paired,
            acquire: self.acquire,
            release: false,
            atomic: false,
        }
    }

    /// Memory-access modifiers of the secondary store.
    pub const fn store_flags(&self) -> MemFlags {
        MemFlags {
            non_temporal: self.non_temporal,
            paired: self.paired,
            acquire: false,
            release: self.release,
            atomic: self.atomic,
        }
    }

    /// Returns `true` if any memory-access flag is set.
    pub const fn any_memory_flag(&self) -> bool {
        self.store
            || self.non_temporal
            || self.prefetch
            || self.paired
            || self.acquire
            || self.release
            || self.atomic
            || self.barrier
            || self.streaming
            || self.huge_pages
    }

    /// Checks every range that does not depend on the line size.
    pub fn validate_fields(&self) -> Result<()> {
        if self.inst_footprint > MAX_INST_FOOTPRINT {
            return Err(Error::invalid(
                "inst_footprint",
                format!("{} exceeds {MAX_INST_FOOTPRINT}", self.inst_footprint),
            ));
        }
        if self.data_footprint > MAX_DATA_FOOTPRINT {
            return Err(Error::invalid(
                "data_footprint",
                format!("{} exceeds {MAX_DATA_FOOTPRINT}", self.data_footprint),
            ));
        }
        if !(1..=MAX_DISPERSION).contains(&self.dispersion) {
            return Err(Error::invalid(
                "dispersion",
                format!("{} is outside 1..={MAX_DISPERSION}", self.dispersion),
            ));
        }
        if self.alignment < POINTER_SIZE || !self.alignment.is_power_of_two() {
            return Err(Error::invalid(
                "alignment",
                format!("{} is not a power of two >= {POINTER_SIZE}", self.alignment),
            ));
        }
        if self.data_offset < POINTER_SIZE || self.data_offset % POINTER_SIZE != 0 {
            return Err(Error::invalid(
                "data_offset",
                format!("{} is not a positive multiple of {POINTER_SIZE}", self.data_offset),
            ));
        }
        if self.fp_intensity > MAX_FP_INTENSITY {
            return Err(Error::invalid(
                "fp_intensity",
                format!("{} exceeds {MAX_FP_INTENSITY}", self.fp_intensity),
            ));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(Error::invalid(
                "concurrency",
                format!("{} is outside 1..={MAX_CONCURRENCY}", self.concurrency),
            ));
        }
        if self.loop_count > MAX_LOOP_COUNT {
            return Err(Error::invalid(
                "loop_count",
                format!("{} exceeds {MAX_LOOP_COUNT}", self.loop_count),
            ));
        }
        if !self.has_data() && self.any_memory_flag() {
            return Err(Error::invalid(
                "data_footprint",
                "memory-access flags need a data region",
            ));
        }
        Ok(())
    }

    /// Checks every range, including those relative to the chunk size.
    pub fn validate(&self, line: usize) -> Result<()> {
        self.validate_fields()?;
        let chunk = self.chunk(line);
        if self.alignment > chunk {
            return Err(Error::invalid(
                "alignment",
                format!("{} exceeds the {chunk}-byte chunk", self.alignment),
            ));
        }
        if self.data_offset + 2 * POINTER_SIZE > chunk || self.slot_span() > chunk {
            return Err(Error::invalid(
                "data_offset",
                format!("{} leaves no room in the {chunk}-byte chunk", self.data_offset),
            ));
        }
        Ok(())
    }
}
