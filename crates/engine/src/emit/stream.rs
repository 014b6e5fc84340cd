//! Line-stitched code stream.
//!
//! The stream writes instruction sequences into a code buffer one cache line
//! at a time, starting at the highest line and moving toward offset 0. Every
//! line keeps room for one unconditional branch; when the next sequence does
//! not fit, the stream branches to the start of the previous line and
//! continues there. Execution therefore visits lines in descending address
//! order, which defeats next-line instruction prefetchers.
//!
//! Each request produces either a complete sequence or nothing: encoders
//! reject unsupported operations before the stream touches the buffer, and
//! the stream counts those rejections so [`CodeStream::finish`] can fail the
//! build even when a caller chose to continue.

use tracing::trace;

use crate::common::constants::LINE_GRANULE;
use crate::common::{EmitError, Error, Result};
use crate::isa::{Encoder, Fence, FpOp, Gpr, Marker, MemAccess, Precision, Seq, Vreg, Width};

use super::Tally;

/// Token returned by [`CodeStream::loop_begin`]; consumed by [`CodeStream::loop_end`].
#[derive(Debug)]
#[must_use = "a loop must be closed with `loop_end`"]
pub struct LoopLabel {
    head: usize,
    depth: usize,
    counter: Gpr,
}

/// Placement summary returned by [`CodeStream::finish`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Offset of the first instruction (start of the highest line).
    pub entry: usize,
    /// Offset of the lowest line used.
    pub low: usize,
    /// Offset one past the last byte written.
    pub end: usize,
    /// Bytes of instructions written, inter-line branches included.
    pub bytes: usize,
    /// Inter-line branches inserted.
    pub branches: usize,
}

/// Cache-line aware instruction writer.
pub struct CodeStream<'a> {
    encoder: &'a dyn Encoder,
    buf: &'a mut [u8],
    tally: &'a mut Tally,
    line: usize,
    line_start: usize,
    pos: usize,
    entry: usize,
    alternate: bool,
    verbose: bool,
    multipliers: Vec<u64>,
    errors: u32,
    bytes: usize,
    branches: usize,
}

impl std::fmt::Debug for CodeStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStream")
            .field("isa", &self.encoder.isa())
            .field("line", &self.line)
            .field("pos", &self.pos)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl<'a> CodeStream<'a> {
    /// Creates a stream over `buf` with `line`-byte lines.
    ///
    /// The buffer is filled with the encoder's trap pattern and emission starts
    /// at the last line.
    ///
    /// # Panics
    ///
    /// Panics if `line` is not a multiple of the line granule, cannot hold the
    /// longest fixed sequence, or `buf` is not a whole number of lines.
    pub fn new(encoder: &'a dyn Encoder, buf: &'a mut [u8], line: usize, tally: &'a mut Tally) -> Self {
        assert!(
            line >= LINE_GRANULE && line % LINE_GRANULE == 0,
            "line size {line} is not a multiple of {LINE_GRANULE}"
        );
        assert!(
            line > encoder.branch_len() + encoder.loop_tail_len(),
            "line size {line} cannot hold a loop tail"
        );
        assert!(
            !buf.is_empty() && buf.len() % line == 0,
            "code buffer of {} bytes is not a whole number of {line}-byte lines",
            buf.len()
        );
        encoder.fill(buf);
        let entry = buf.len() - line;
        Self {
            encoder,
            buf,
            tally,
            line,
            line_start: entry,
            pos: entry,
            entry,
            alternate: false,
            verbose: false,
            multipliers: vec![1],
            errors: 0,
            bytes: 0,
            branches: 0,
        }
    }

    /// Selects the alternate encoding form for subsequent requests.
    #[must_use]
    pub const fn with_alternate(mut self, alternate: bool) -> Self {
        self.alternate = alternate;
        self
    }

    /// Traces every inter-line branch.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Encoder this stream writes for.
    pub fn encoder(&self) -> &'a dyn Encoder {
        self.encoder
    }

    /// Current write offset.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Offset of the first instruction.
    pub const fn entry(&self) -> usize {
        self.entry
    }

    /// Bytes written so far, inter-line branches included.
    pub const fn bytes_emitted(&self) -> usize {
        self.bytes
    }

    /// Lines below the current one that are still empty.
    pub const fn remaining_lines(&self) -> usize {
        self.line_start / self.line
    }

    /// Unsupported encodings rejected so far.
    pub const fn errors(&self) -> u32 {
        self.errors
    }

    /// Product of the trip counts of all open loops.
    pub fn multiplier(&self) -> u64 {
        self.multipliers.last().copied().unwrap_or(1)
    }

    /// Ensures `len` bytes fit in the current line, branching to the previous line if not.
    ///
    /// # Errors
    ///
    /// [`EmitError::TooLong`] if no line can hold `len` bytes next to a branch;
    /// [`EmitError::OutOfSpace`] if line 0 is full.
    pub fn reserve(&mut self, len: usize) -> Result<(), EmitError> {
        let usable = self.line - self.encoder.branch_len();
        if len > usable {
            return Err(EmitError::TooLong { len, line: self.line });
        }
        if self.pos + len <= self.line_start + usable {
            return Ok(());
        }
        if self.line_start == 0 {
            return Err(EmitError::OutOfSpace);
        }
        let previous = self.line_start - self.line;
        let from = self.pos;
        let mut seq = Seq::new();
        self.encoder.jump(&mut seq, from, previous)?;
        self.commit(&seq);
        self.branches += 1;
        if self.verbose {
            trace!(from, to = previous, "line stitched");
        }
        self.line_start = previous;
        self.pos = previous;
        Ok(())
    }

    /// Writes an already encoded sequence.
    pub fn emit(&mut self, seq: &Seq) -> Result<(), EmitError> {
        self.reserve(seq.len())?;
        self.commit(seq);
        Ok(())
    }

    /// Encodes with `f` and writes the result; counts unsupported encodings.
    pub fn record<F>(&mut self, f: F) -> Result<(), EmitError>
    where
        F: FnOnce(&dyn Encoder, &mut Seq, bool) -> Result<(), EmitError>,
    {
        let mut seq = Seq::new();
        if let Err(err) = f(self.encoder, &mut seq, self.alternate) {
            if matches!(err, EmitError::Unsupported(_) | EmitError::BranchRange(_)) {
                self.errors += 1;
            }
            return Err(err);
        }
        self.emit(&seq)
    }

    /// Floating-point data processing.
    pub fn fp(&mut self, op: &FpOp) -> Result<(), EmitError> {
        self.record(|e, seq, alt| e.fp(seq, op, alt))
    }

    /// Loads a 64-bit immediate.
    pub fn load_imm(&mut self, rd: Gpr, imm: u64) -> Result<(), EmitError> {
        self.record(|e, seq, _| e.load_imm(seq, rd, imm))
    }

    /// Broadcasts the low bits of `src` into every lane of `dst`.
    pub fn splat(&mut self, dst: Vreg, src: Gpr, precision: Precision, width: Width) -> Result<(), EmitError> {
        self.record(|e, seq, alt| e.splat(seq, dst, src, precision, width, alt))
    }

    /// A memory access.
    pub fn mem(&mut self, access: &MemAccess) -> Result<(), EmitError> {
        self.record(|e, seq, alt| e.mem(seq, access, alt))
    }

    /// A memory barrier.
    pub fn fence(&mut self, kind: Fence) -> Result<(), EmitError> {
        self.record(|e, seq, _| e.fence(seq, kind))
    }

    /// A data prefetch.
    pub fn prefetch(&mut self, base: Gpr, offset: i32, non_temporal: bool) -> Result<(), EmitError> {
        self.record(|e, seq, _| e.prefetch(seq, base, offset, non_temporal))
    }

    /// A trace marker.
    pub fn marker(&mut self, marker: Marker) -> Result<(), EmitError> {
        self.record(|e, seq, _| e.marker(seq, marker))
    }

    /// Return to the caller.
    pub fn ret(&mut self) -> Result<(), EmitError> {
        self.record(|e, seq, alt| e.ret(seq, alt))
    }

    /// Sets `counter` to `trip` and opens a loop; later instructions count `trip` times.
    ///
    /// # Panics
    ///
    /// Panics if `trip` is zero.
    pub fn loop_begin(&mut self, counter: Gpr, trip: u32) -> Result<LoopLabel, EmitError> {
        assert!(trip > 0, "loop trip count must be positive");
        self.load_imm(counter, u64::from(trip))?;
        let next = self.multiplier().saturating_mul(u64::from(trip));
        self.multipliers.push(next);
        Ok(LoopLabel {
            head: self.pos,
            depth: self.multipliers.len(),
            counter,
        })
    }

    /// Closes the innermost loop, restoring the previous multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `label` does not belong to the innermost open loop.
    pub fn loop_end(&mut self, label: LoopLabel) -> Result<(), EmitError> {
        assert_eq!(label.depth, self.multipliers.len(), "loops closed out of order");
        let result = self.loop_tail(&label);
        let _ = self.multipliers.pop();
        result
    }

    fn loop_tail(&mut self, label: &LoopLabel) -> Result<(), EmitError> {
        self.reserve(self.encoder.loop_tail_len())?;
        let at = self.pos;
        self.record(|e, seq, _| e.loop_tail(seq, label.counter, at, label.head))
    }

    /// Completes the stream.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] if any request was rejected as unsupported.
    ///
    /// # Panics
    ///
    /// Panics if a loop is still open.
    pub fn finish(self) -> Result<Layout> {
        assert_eq!(self.multipliers.len(), 1, "unclosed loop at end of stream");
        if self.errors > 0 {
            return Err(Error::Unsupported(self.errors));
        }
        Ok(Layout {
            entry: self.entry,
            low: self.line_start,
            end: self.pos,
            bytes: self.bytes,
            branches: self.branches,
        })
    }

    fn commit(&mut self, seq: &Seq) {
        let end = self.pos + seq.len();
        self.buf[self.pos..end].copy_from_slice(seq.bytes());
        self.tally.add_scaled(seq.tally(), self.multiplier());
        self.bytes += seq.len();
        self.pos = end;
    }
}
