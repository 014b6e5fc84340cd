//! # x86-64 Encoding Tests
//!
//! Reference bytes were hand-assembled from the SDM opcode tables.

use pretty_assertions::assert_eq;
use rstest::rstest;
use synthload_core::isa::{
    Fence, FpKind, FpOp, Gpr, Isa, MemAccess, MemFlags, Precision, Seq, Vreg, Width,
};
use synthload_core::EmitError;

use crate::common::encode;

const RDX: Gpr = Gpr(2);
const RSI: Gpr = Gpr(6);

// ──────────────────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────────────────

fn op(kind: FpKind, precision: Precision, width: Width, dst: u8, srcs: &[u8]) -> FpOp {
    let srcs: Vec<Vreg> = srcs.iter().copied().map(Vreg).collect();
    FpOp::new(kind, precision, width, Vreg(dst), &srcs)
}

fn fp_bytes(op_: &FpOp, alternate: bool) -> Vec<u8> {
    encode(Isa::X86_64, |e, seq| e.fp(seq, op_, alternate)).bytes().to_vec()
}

fn fp_err(op_: &FpOp, alternate: bool) -> EmitError {
    let mut seq = Seq::new();
    let err = Isa::X86_64.encoder().fp(&mut seq, op_, alternate).unwrap_err();
    assert!(seq.is_empty(), "rejected encoding left bytes behind");
    err
}

fn flags(f: impl FnOnce(&mut MemFlags)) -> MemFlags {
    let mut flags = MemFlags::default();
    f(&mut flags);
    flags
}

// ──────────────────────────────────────────────────────────
// Floating point
// ──────────────────────────────────────────────────────────

#[rstest]
#[case::addps(op(FpKind::Add, Precision::Single, Width::V128, 1, &[1, 2]), false, &[0x0F, 0x58, 0xCA])]
#[case::addsd(op(FpKind::Add, Precision::Double, Width::Scalar, 1, &[1, 0]), false, &[0xF2, 0x0F, 0x58, 0xC8])]
#[case::vaddps_ymm(op(FpKind::Add, Precision::Single, Width::V256, 1, &[2, 3]), true, &[0xC5, 0xEC, 0x58, 0xCB])]
#[case::vfmadd231ps(op(FpKind::FmAdd, Precision::Single, Width::V128, 1, &[2, 3]), true, &[0xC4, 0xE2, 0x69, 0xB8, 0xCB])]
#[case::dpps(op(FpKind::Dot4, Precision::Single, Width::V128, 1, &[1, 2]), false, &[0x66, 0x0F, 0x3A, 0x40, 0xCA, 0xF1])]
fn test_x86_fp_encodings(#[case] op_: FpOp, #[case] alternate: bool, #[case] expected: &[u8]) {
    assert_eq!(fp_bytes(&op_, alternate), expected);
}

#[test]
fn test_x86_fp_flop_accounting() {
    let add = encode(Isa::X86_64, |e, seq| {
        e.fp(seq, &op(FpKind::Add, Precision::Single, Width::V128, 1, &[1, 2]), false)
    });
    assert_eq!(add.tally().flops_single, 4);

    let fma = encode(Isa::X86_64, |e, seq| {
        e.fp(seq, &op(FpKind::FmAdd, Precision::Double, Width::V256, 1, &[2, 3]), true)
    });
    assert_eq!(fma.tally().flops_double, 8);

    let dot = encode(Isa::X86_64, |e, seq| {
        e.fp(seq, &op(FpKind::Dot4, Precision::Single, Width::V128, 1, &[1, 2]), false)
    });
    assert_eq!(dot.tally().flops_single, 7);
    assert_eq!(dot.tally().fp_instructions, 1);
}

#[test]
fn test_x86_unsupported_fp() {
    let neg_in_place = op(FpKind::Neg, Precision::Double, Width::Scalar, 1, &[1]);
    assert!(matches!(fp_err(&neg_in_place, false), EmitError::Unsupported(_)));

    let fma_legacy = op(FpKind::FmAdd, Precision::Double, Width::Scalar, 1, &[2, 3]);
    assert!(matches!(fp_err(&fma_legacy, false), EmitError::Unsupported(_)));

    let half = op(FpKind::Add, Precision::Half, Width::Scalar, 1, &[1, 2]);
    assert!(matches!(fp_err(&half, true), EmitError::Unsupported(_)));

    let wide = op(FpKind::Add, Precision::Double, Width::V512, 1, &[1, 2]);
    assert!(matches!(fp_err(&wide, true), EmitError::Unsupported(_)));

    let ymm_legacy = op(FpKind::Add, Precision::Double, Width::V256, 1, &[1, 2]);
    assert!(matches!(fp_err(&ymm_legacy, false), EmitError::Unsupported(_)));
}

#[test]
fn test_x86_neg_into_other_register() {
    let seq = encode(Isa::X86_64, |e, seq| {
        e.fp(seq, &op(FpKind::Neg, Precision::Double, Width::Scalar, 1, &[0]), false)
    });
    assert_eq!(seq.tally().instructions, 2);
    assert_eq!(seq.tally().flops_double, 1);
}

#[test]
fn test_x86_splat_double_vector() {
    let seq = encode(Isa::X86_64, |e, seq| {
        e.splat(seq, Vreg(1), Gpr(0), Precision::Double, Width::V128, false)
    });
    assert_eq!(
        seq.bytes(),
        &[0x66, 0x48, 0x0F, 0x6E, 0xC8, 0x66, 0x0F, 0x70, 0xC9, 0x44]
    );
    assert_eq!(seq.tally().moves, 2);
}

// ──────────────────────────────────────────────────────────
// Memory
// ──────────────────────────────────────────────────────────

#[rstest]
#[case::chase(MemAccess::load(RSI, RSI, 0), &[0x48, 0x8B, 0x36])]
#[case::store(MemAccess::store(RDX, RSI, 8), &[0x48, 0x89, 0x56, 0x08])]
#[case::atomic(MemAccess::store(RDX, RSI, 8).with_flags(flags(|f| f.atomic = true)), &[0xF0, 0x48, 0x01, 0x56, 0x08])]
#[case::movnti(MemAccess::store(RDX, RSI, 8).with_flags(flags(|f| f.non_temporal = true)), &[0x48, 0x0F, 0xC3, 0x56, 0x08])]
fn test_x86_mem_encodings(#[case] access: MemAccess, #[case] expected: &[u8]) {
    let seq = encode(Isa::X86_64, |e, seq| e.mem(seq, &access, false));
    assert_eq!(seq.bytes(), expected);
}

#[test]
fn test_x86_atomic_counts_as_load_and_store() {
    let access = MemAccess::store(RDX, RSI, 8).with_flags(flags(|f| f.atomic = true));
    let seq = encode(Isa::X86_64, |e, seq| e.mem(seq, &access, false));
    let t = seq.tally();
    assert_eq!((t.atomics, t.loads, t.stores), (1, 1, 1));
    assert_eq!((t.bytes_read, t.bytes_written), (8, 8));
}

#[test]
fn test_x86_unsupported_mem() {
    let encoder = Isa::X86_64.encoder();
    let paired = MemAccess::load(RSI, RSI, 0)
        .with_pair(Gpr(8))
        .with_flags(flags(|f| f.paired = true));
    let nt_load = MemAccess::load(RSI, RSI, 0).with_flags(flags(|f| f.non_temporal = true));
    for access in [paired, nt_load] {
        let mut seq = Seq::new();
        assert!(matches!(
            encoder.mem(&mut seq, &access, false),
            Err(EmitError::Unsupported(_))
        ));
        assert!(seq.is_empty());
    }
}

// ──────────────────────────────────────────────────────────
// Control and miscellaneous
// ──────────────────────────────────────────────────────────

#[test]
fn test_x86_fence_prefetch_imm() {
    let fence = encode(Isa::X86_64, |e, seq| e.fence(seq, Fence::Full));
    assert_eq!(fence.bytes(), &[0x0F, 0xAE, 0xF0]);

    let prefetch = encode(Isa::X86_64, |e, seq| e.prefetch(seq, RSI, 64, false));
    assert_eq!(prefetch.bytes(), &[0x0F, 0x18, 0x4E, 0x40]);

    let imm = encode(Isa::X86_64, |e, seq| e.load_imm(seq, Gpr(1), 1000));
    assert_eq!(imm.bytes(), &[0xB9, 0xE8, 0x03, 0x00, 0x00]);

    let wide = encode(Isa::X86_64, |e, seq| e.load_imm(seq, Gpr(0), 0x3FF0_0000_0000_0000));
    assert_eq!(wide.bytes(), &[0x48, 0xB8, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
}

#[test]
fn test_x86_branches() {
    let jump = encode(Isa::X86_64, |e, seq| e.jump(seq, 59, 0));
    assert_eq!(jump.bytes(), &[0xE9, 0xC0, 0xFF, 0xFF, 0xFF]);

    let tail = encode(Isa::X86_64, |e, seq| e.loop_tail(seq, Gpr(1), 100, 50));
    assert_eq!(
        tail.bytes(),
        &[0x48, 0xFF, 0xC9, 0x0F, 0x85, 0xC5, 0xFF, 0xFF, 0xFF]
    );
    assert_eq!(tail.len(), Isa::X86_64.encoder().loop_tail_len());

    let ret = encode(Isa::X86_64, |e, seq| e.ret(seq, true));
    assert_eq!(ret.bytes(), &[0xC5, 0xF8, 0x77, 0xC3]);
}

#[test]
fn test_x86_fill_traps() {
    let mut buf = [0u8; 8];
    Isa::X86_64.encoder().fill(&mut buf);
    assert_eq!(buf, [0xCC; 8]);
}

#[test]
fn test_x86_markers_unsupported() {
    let mut seq = Seq::new();
    let result = Isa::X86_64
        .encoder()
        .marker(&mut seq, synthload_core::isa::Marker::Start);
    assert!(matches!(result, Err(EmitError::Unsupported(_))));
    assert!(seq.is_empty());
}
