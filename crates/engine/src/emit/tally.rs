//! Expected dynamic instruction counts.
//!
//! A [`Tally`] counts what one call of the generated entry point is expected to
//! execute. Instructions inside an emitted loop are counted once per iteration
//! through the stream's multiplier stack.

use serde::Serialize;

use crate::isa::{Class, Precision};

/// Expected instruction mix of one workload invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Total instructions.
    pub instructions: u64,
    /// Register moves and immediate loads.
    pub moves: u64,
    /// Integer arithmetic.
    pub integer: u64,
    /// Branches, including inter-line branches and the return.
    pub branches: u64,
    /// Memory barriers.
    pub fences: u64,
    /// Prefetches.
    pub prefetches: u64,
    /// Trace marker hints.
    pub hints: u64,
    /// Instructions that read memory (atomics included).
    pub loads: u64,
    /// Instructions that write memory (atomics included).
    pub stores: u64,
    /// Atomic read-modify-write instructions.
    pub atomics: u64,
    /// Bytes read.
    pub bytes_read: u64,
    /// Bytes written.
    pub bytes_written: u64,
    /// Floating-point instructions.
    pub fp_instructions: u64,
    /// Half-precision floating-point operations.
    pub flops_half: u64,
    /// Single-precision floating-point operations.
    pub flops_single: u64,
    /// Double-precision floating-point operations.
    pub flops_double: u64,
}

impl Tally {
    /// Counts one instruction of `class`.
    pub fn record(&mut self, class: Class) {
        self.instructions += 1;
        match class {
            Class::Move => self.moves += 1,
            Class::Integer => self.integer += 1,
            Class::Branch => self.branches += 1,
            Class::Fence => self.fences += 1,
            Class::Prefetch => self.prefetches += 1,
            Class::Hint => self.hints += 1,
            Class::Load(bytes) => {
                self.loads += 1;
                self.bytes_read += u64::from(bytes);
            }
            Class::Store(bytes) => {
                self.stores += 1;
                self.bytes_written += u64::from(bytes);
            }
            Class::Atomic(bytes) => {
                self.atomics += 1;
                self.loads += 1;
                self.stores += 1;
                self.bytes_read += u64::from(bytes);
                self.bytes_written += u64::from(bytes);
            }
            Class::Fp { precision, flops } => {
                self.fp_instructions += 1;
                *self.flops_mut(precision) += u64::from(flops);
            }
        }
    }

    /// Adds `other` scaled by `factor`.
    pub fn add_scaled(&mut self, other: &Self, factor: u64) {
        let fields = [
            (&mut self.instructions, other.instructions),
            (&mut self.moves, other.moves),
            (&mut self.integer, other.integer),
            (&mut self.branches, other.branches),
            (&mut self.fences, other.fences),
            (&mut self.prefetches, other.prefetches),
            (&mut self.hints, other.hints),
            (&mut self.loads, other.loads),
            (&mut self.stores, other.stores),
            (&mut self.atomics, other.atomics),
            (&mut self.bytes_read, other.bytes_read),
            (&mut self.bytes_written, other.bytes_written),
            (&mut self.fp_instructions, other.fp_instructions),
            (&mut self.flops_half, other.flops_half),
            (&mut self.flops_single, other.flops_single),
            (&mut self.flops_double, other.flops_double),
        ];
        for (dst, src) in fields {
            *dst = dst.saturating_add(src.saturating_mul(factor));
        }
    }

    /// Floating-point operations of one precision.
    pub const fn flops(&self, precision: Precision) -> u64 {
        match precision {
            Precision::Half => self.flops_half,
            Precision::Single => self.flops_single,
            Precision::Double => self.flops_double,
        }
    }

    /// Floating-point operations over all precisions.
    pub const fn total_flops(&self) -> u64 {
        self.flops_half + self.flops_single + self.flops_double
    }

    fn flops_mut(&mut self, precision: Precision) -> &mut u64 {
        match precision {
            Precision::Half => &mut self.flops_half,
            Precision::Single => &mut self.flops_single,
            Precision::Double => &mut self.flops_double,
        }
    }
}
