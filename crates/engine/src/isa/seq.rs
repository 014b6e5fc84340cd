//! Instruction sequence buffer.
//!
//! Encoders append whole instructions to a [`Seq`] together with their
//! [`Class`]; the code stream copies the bytes into the code region and folds
//! the per-sequence [`Tally`] into the workload totals.

use crate::emit::Tally;

use super::Precision;

/// Accounting class of one encoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    /// Register move or immediate materialization.
    Move,
    /// Integer arithmetic.
    Integer,
    /// Any branch, including returns.
    Branch,
    /// Memory barrier.
    Fence,
    /// Data prefetch.
    Prefetch,
    /// Architectural no-op hint (trace markers).
    Hint,
    /// Load of this many bytes.
    Load(u32),
    /// Store of this many bytes.
    Store(u32),
    /// Atomic read-modify-write of this many bytes.
    Atomic(u32),
    /// Floating-point instruction performing `flops` operations.
    Fp {
        /// Element precision.
        precision: Precision,
        /// Floating-point operations over all lanes.
        flops: u32,
    },
}

/// Encoded instructions and their accounting.
#[derive(Clone, Debug, Default)]
pub struct Seq {
    bytes: Vec<u8>,
    tally: Tally,
}

impl Seq {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one instruction.
    pub fn push(&mut self, bytes: &[u8], class: Class) {
        self.bytes.extend_from_slice(bytes);
        self.tally.record(class);
    }

    /// Appends one little-endian 32-bit instruction word.
    pub fn push_word(&mut self, word: u32, class: Class) {
        self.push(&word.to_le_bytes(), class);
    }

    /// Encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing was encoded.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Accounting of the encoded instructions.
    pub const fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Decodes the sequence as little-endian 32-bit words (fixed-width targets).
    pub fn words(&self) -> Vec<u32> {
        self.bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect()
    }
}
