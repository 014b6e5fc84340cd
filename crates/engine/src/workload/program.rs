//! Workload program generation.
//!
//! The generated entry point has the shape
//!
//! ```text
//! prologue : [trace start] ; cursor = *arg ; value = 1 ;
//!            K and 1.0 broadcast into the FP registers ; [loop counter]
//! body     : units until the footprint is covered (at least one):
//!              [prefetch cursor+line] ; cursor = *cursor ;
//!              [store value -> cursor+data_offset] ; [full fence] ;
//!              fp_intensity FP ops round-robin over the chains
//!            [loop tail]
//! epilogue : *arg = cursor ; [trace stop] ; return
//! ```
//!
//! `K` is 0.0 for additive operations and 1.0 otherwise, so recirculating
//! values stay finite no matter how many iterations run.

use crate::characteristic::Characteristic;
use crate::common::EmitError;
use crate::emit::CodeStream;
use crate::isa::{Fence, FpKind, FpOp, Marker, MemAccess, Vreg};

/// Value written by secondary stores and added by atomic stores.
const STORE_VALUE: u64 = 1;

/// Lines kept free below the body for the loop tail and the epilogue.
const TAIL_LINES: usize = 2;

/// Resolved generation parameters.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Plan<'c> {
    pub characteristic: &'c Characteristic,
    pub line: usize,
    /// Inner loop trip count; 1 emits no loop.
    pub trip: u32,
    /// FP dependency chains after clamping.
    pub chains: u32,
}

impl Plan<'_> {
    /// Bit pattern of the recirculation constant.
    fn constant(&self) -> u64 {
        let c = self.characteristic;
        if c.operation.is_additive() { 0 } else { c.precision.one() }
    }
}

/// Emits the complete program into `stream`.
///
/// Stops at the first rejected request; the stream's error counter records it.
pub(crate) fn generate(stream: &mut CodeStream<'_>, plan: &Plan<'_>) -> Result<(), EmitError> {
    let c = plan.characteristic;
    let regs = stream.encoder().registers();

    if c.trace_markers {
        stream.marker(Marker::Start)?;
    }
    if c.has_data() {
        stream.mem(&MemAccess::load(regs.cursor, regs.arg, 0))?;
    }
    if c.store {
        stream.load_imm(regs.value, STORE_VALUE)?;
    }
    let fp = FpRegisters::assign(stream.encoder().fp_budget(), plan.chains);
    if c.fp_intensity > 0 {
        warm_up(stream, plan, &fp)?;
    }

    let label = if plan.trip > 1 {
        Some(stream.loop_begin(regs.counter, plan.trip)?)
    } else {
        None
    };
    let start = stream.bytes_emitted();
    let mut turn = 0;
    loop {
        unit(stream, plan, &fp, &mut turn)?;
        let covered = stream.bytes_emitted() - start >= c.inst_footprint;
        if covered || stream.remaining_lines() < TAIL_LINES {
            break;
        }
    }
    if let Some(label) = label {
        stream.loop_end(label)?;
    }

    if c.has_data() {
        stream.mem(&MemAccess::store(regs.cursor, regs.arg, 0))?;
    }
    if c.trace_markers {
        stream.marker(Marker::Stop)?;
    }
    stream.ret()
}

/// FP registers of the program: the constant and one per chain.
struct FpRegisters {
    constant: Vreg,
    chains: Vec<Vreg>,
}

impl FpRegisters {
    fn assign(budget: &[Vreg], chains: u32) -> Self {
        let constant = budget[0];
        let chains = budget[1..].iter().take(chains as usize).copied().collect();
        Self { constant, chains }
    }
}

/// Loads `K` and seeds every chain register with 1.0.
fn warm_up(stream: &mut CodeStream<'_>, plan: &Plan<'_>, fp: &FpRegisters) -> Result<(), EmitError> {
    let c = plan.characteristic;
    let scratch = stream.encoder().registers().scratch;
    stream.load_imm(scratch, plan.constant())?;
    stream.splat(fp.constant, scratch, c.precision, c.simd_width)?;
    stream.load_imm(scratch, c.precision.one())?;
    for &reg in &fp.chains {
        stream.splat(reg, scratch, c.precision, c.simd_width)?;
    }
    Ok(())
}

/// One memory reference and its FP work.
fn unit(
    stream: &mut CodeStream<'_>,
    plan: &Plan<'_>,
    fp: &FpRegisters,
    turn: &mut usize,
) -> Result<(), EmitError> {
    let c = plan.characteristic;
    let regs = stream.encoder().registers();
    if c.has_data() {
        if c.prefetch {
            let ahead = i32::try_from(plan.line).map_err(|_| EmitError::Unsupported("prefetch distance"))?;
            stream.prefetch(regs.cursor, ahead, c.non_temporal)?;
        }
        let load = MemAccess::load(regs.cursor, regs.cursor, 0)
            .with_flags(c.load_flags())
            .with_pair(regs.pair);
        stream.mem(&load)?;
        if c.store {
            let offset =
                i32::try_from(c.data_offset).map_err(|_| EmitError::Unsupported("store offset"))?;
            let store = MemAccess::store(regs.value, regs.cursor, offset)
                .with_flags(c.store_flags())
                .with_pair(regs.pair);
            stream.mem(&store)?;
        }
        if c.barrier {
            stream.fence(Fence::Full)?;
        }
    }
    for _ in 0..c.fp_intensity {
        let chain = fp.chains[*turn % fp.chains.len()];
        *turn += 1;
        stream.fp(&operation(c, chain, fp.constant))?;
    }
    Ok(())
}

/// The FP request applied to `chain`.
///
/// Unary kinds read the constant; every other kind reads and writes the chain.
fn operation(c: &Characteristic, chain: Vreg, constant: Vreg) -> FpOp {
    let srcs: &[Vreg] = match c.operation {
        FpKind::Mov | FpKind::Neg | FpKind::Sqrt => &[constant],
        _ => &[chain, constant],
    };
    FpOp::new(c.operation, c.precision, c.simd_width, chain, srcs)
}
