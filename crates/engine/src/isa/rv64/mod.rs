//! RV64 encoder.
//!
//! Scalar F and D arithmetic in the default form; the alternate form enables
//! Zfh half precision. There are no vector encodings, so every vector width,
//! reduction and paired access is rejected. Prefetches use the Zicbop
//! `prefetch.r` hint, which executes as a no-op on cores without Zicbop.
//!
//! Register roles follow the LP64D calling convention: `a0`-`a5` and the
//! `ft*`/`fa*` registers are caller-saved.

use crate::common::EmitError;

use super::{
    Class, Direction, Encoder, Fence, FpKind, FpOp, Gpr, Isa, MemAccess, Precision, Registers,
    Seq, Vreg, Width, displacement,
};

/// Instruction format assemblers.
pub mod format;

/// Opcodes and function codes.
pub mod opcodes;

use opcodes::{
    OP_AMO, OP_BRANCH, OP_FMADD, OP_FMSUB, OP_FNMADD, OP_FNMSUB, OP_FP, OP_IMM, OP_IMM_32,
    OP_JAL, OP_JALR, OP_LOAD, OP_LUI, OP_MISC_MEM, OP_STORE, fence, fmt, funct3, funct5,
    prefetch,
};

/// RV64 encoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rv64;

const ZERO: u8 = 0;
const RA: u8 = 1;

static REGISTERS: Registers = Registers {
    arg: Gpr(10),
    cursor: Gpr(11),
    counter: Gpr(12),
    scratch: Gpr(13),
    value: Gpr(14),
    pair: Gpr(15),
};

static FP_BUDGET: [Vreg; 20] = [
    Vreg(0),
    Vreg(1),
    Vreg(2),
    Vreg(3),
    Vreg(4),
    Vreg(5),
    Vreg(6),
    Vreg(7),
    Vreg(10),
    Vreg(11),
    Vreg(12),
    Vreg(13),
    Vreg(14),
    Vreg(15),
    Vreg(16),
    Vreg(17),
    Vreg(28),
    Vreg(29),
    Vreg(30),
    Vreg(31),
];

const fn format_of(precision: Precision) -> u32 {
    match precision {
        Precision::Half => fmt::H,
        Precision::Single => fmt::S,
        Precision::Double => fmt::D,
    }
}

const fn fits_i12(value: i64) -> bool {
    value >= -2048 && value < 2048
}

impl Rv64 {
    /// `li rd, imm` as LUI/ADDIW for 32-bit values, otherwise recursively with SLLI/ADDI.
    fn li(seq: &mut Seq, rd: u8, imm: i64) {
        if let Ok(v) = i32::try_from(imm) {
            let lo = ((v & 0xFFF) ^ 0x800) - 0x800;
            let hi = (v.wrapping_sub(lo) as u32) >> 12;
            if hi == 0 {
                seq.push_word(format::i(OP_IMM, rd, funct3::ADD_BEQ, ZERO, lo), Class::Move);
                return;
            }
            seq.push_word(format::u(OP_LUI, rd, hi), Class::Move);
            if lo != 0 {
                seq.push_word(format::i(OP_IMM_32, rd, funct3::ADD_BEQ, rd, lo), Class::Move);
            }
            return;
        }
        let lo = ((imm & 0xFFF) ^ 0x800) - 0x800;
        let mut hi = imm.wrapping_sub(lo) >> 12;
        let zeros = hi.trailing_zeros();
        hi >>= zeros;
        Self::li(seq, rd, hi);
        seq.push_word(
            format::i(OP_IMM, rd, funct3::SLL_BNE, rd, (12 + zeros) as i32),
            Class::Move,
        );
        if lo != 0 {
            seq.push_word(format::i(OP_IMM, rd, funct3::ADD_BEQ, rd, lo as i32), Class::Move);
        }
    }

    fn fence_word(pred: u32, succ: u32) -> u32 {
        format::i(OP_MISC_MEM, ZERO, funct3::ADD_BEQ, ZERO, ((pred << 4) | succ) as i32)
    }

    fn jal_word(disp: i64) -> Result<u32, EmitError> {
        if disp % 2 != 0 || !(-(1 << 20)..(1 << 20)).contains(&disp) {
            return Err(EmitError::BranchRange(disp));
        }
        Ok(format::j(OP_JAL, ZERO, disp as i32))
    }
}

impl Encoder for Rv64 {
    fn isa(&self) -> Isa {
        Isa::Rv64
    }

    fn registers(&self) -> &'static Registers {
        &REGISTERS
    }

    fn fp_budget(&self) -> &'static [Vreg] {
        &FP_BUDGET
    }

    fn branch_len(&self) -> usize {
        4
    }

    fn loop_tail_len(&self) -> usize {
        12
    }

    fn jump(&self, seq: &mut Seq, from: usize, to: usize) -> Result<(), EmitError> {
        let word = Self::jal_word(displacement(from, to))?;
        seq.push_word(word, Class::Branch);
        Ok(())
    }

    fn fp(&self, seq: &mut Seq, op: &FpOp, alternate: bool) -> Result<(), EmitError> {
        if op.width != Width::Scalar {
            return Err(EmitError::Unsupported("vector registers on RV64"));
        }
        if op.precision == Precision::Half && !alternate {
            return Err(EmitError::Unsupported("half precision needs Zfh"));
        }
        let f = format_of(op.precision);
        let precision = op.precision;
        let class = |flops| Class::Fp { precision, flops };
        let (d, s1, s2) = (op.dst.0, op.src(0).0, op.src(1).0);
        let arith = |funct: u32, rs2: u8| format::r(OP_FP, d, funct3::RM_DYN, s1, rs2, (funct << 2) | f);
        let (word, class) = match op.kind {
            FpKind::Mov => (
                format::r(OP_FP, d, funct3::FSGNJ, s1, s1, (funct5::FSGNJ << 2) | f),
                Class::Move,
            ),
            FpKind::Neg => (
                format::r(OP_FP, d, funct3::FSGNJN, s1, s1, (funct5::FSGNJ << 2) | f),
                class(1),
            ),
            FpKind::Add => (arith(funct5::FADD, s2), class(1)),
            FpKind::Mul => (arith(funct5::FMUL, s2), class(1)),
            FpKind::Div => (arith(funct5::FDIV, s2), class(1)),
            FpKind::Sqrt => (arith(funct5::FSQRT, 0), class(1)),
            FpKind::FmAdd => (format::r4(OP_FMADD, d, funct3::RM_DYN, s1, s2, d, f), class(2)),
            FpKind::FmSub => (format::r4(OP_FMSUB, d, funct3::RM_DYN, s1, s2, d, f), class(2)),
            FpKind::FnmAdd => (format::r4(OP_FNMSUB, d, funct3::RM_DYN, s1, s2, d, f), class(2)),
            FpKind::FnmSub => (format::r4(OP_FNMADD, d, funct3::RM_DYN, s1, s2, d, f), class(2)),
            FpKind::Dot2 | FpKind::Dot4 | FpKind::Dist2 | FpKind::Dist4 => {
                return Err(EmitError::Unsupported("reductions on RV64"));
            }
        };
        seq.push_word(word, class);
        Ok(())
    }

    fn load_imm(&self, seq: &mut Seq, rd: Gpr, imm: u64) -> Result<(), EmitError> {
        Self::li(seq, rd.0, imm as i64);
        Ok(())
    }

    fn splat(
        &self,
        seq: &mut Seq,
        dst: Vreg,
        src: Gpr,
        precision: Precision,
        width: Width,
        alternate: bool,
    ) -> Result<(), EmitError> {
        if width != Width::Scalar {
            return Err(EmitError::Unsupported("vector registers on RV64"));
        }
        if precision == Precision::Half && !alternate {
            return Err(EmitError::Unsupported("half precision needs Zfh"));
        }
        let funct7 = (funct5::FMV_F_X << 2) | format_of(precision);
        seq.push_word(format::r(OP_FP, dst.0, 0, src.0, 0, funct7), Class::Move);
        Ok(())
    }

    fn mem(&self, seq: &mut Seq, access: &MemAccess, _alternate: bool) -> Result<(), EmitError> {
        access.check()?;
        let f = access.flags;
        if access.index.is_some() {
            return Err(EmitError::Unsupported("register-offset addressing on RV64"));
        }
        if f.paired {
            return Err(EmitError::Unsupported("paired accesses on RV64"));
        }
        if f.non_temporal {
            return Err(EmitError::Unsupported("non-temporal accesses on RV64"));
        }
        let offset = i64::from(access.offset);
        if !fits_i12(offset) {
            return Err(EmitError::Unsupported("offset out of range on RV64"));
        }
        let (reg, base, offset) = (access.reg.0, access.base.0, access.offset);
        match access.dir {
            Direction::Load => {
                seq.push_word(format::i(OP_LOAD, reg, funct3::DOUBLE, base, offset), Class::Load(8));
                if f.acquire {
                    seq.push_word(Self::fence_word(fence::R, fence::RW), Class::Fence);
                }
            }
            Direction::Store if f.atomic => {
                let addr = if offset == 0 {
                    base
                } else {
                    let scratch = REGISTERS.scratch.0;
                    seq.push_word(
                        format::i(OP_IMM, scratch, funct3::ADD_BEQ, base, offset),
                        Class::Integer,
                    );
                    scratch
                };
                let funct7 = (funct5::AMOADD << 2) | u32::from(f.release);
                seq.push_word(
                    format::r(OP_AMO, ZERO, funct3::DOUBLE, addr, reg, funct7),
                    Class::Atomic(8),
                );
            }
            Direction::Store => {
                if f.release {
                    seq.push_word(Self::fence_word(fence::RW, fence::W), Class::Fence);
                }
                seq.push_word(format::s(OP_STORE, funct3::DOUBLE, base, reg, offset), Class::Store(8));
            }
        }
        Ok(())
    }

    fn fence(&self, seq: &mut Seq, kind: Fence) -> Result<(), EmitError> {
        let word = match kind {
            Fence::Full => Self::fence_word(fence::RW, fence::RW),
            Fence::Load => Self::fence_word(fence::R, fence::R),
            Fence::Store => Self::fence_word(fence::W, fence::W),
        };
        seq.push_word(word, Class::Fence);
        Ok(())
    }

    fn prefetch(
        &self,
        seq: &mut Seq,
        base: Gpr,
        offset: i32,
        _non_temporal: bool,
    ) -> Result<(), EmitError> {
        if offset % 32 != 0 || !fits_i12(i64::from(offset)) {
            return Err(EmitError::Unsupported("prefetch offset must be a multiple of 32 within ±2 KiB"));
        }
        let imm = offset | prefetch::READ as i32;
        seq.push_word(format::i(OP_IMM, ZERO, funct3::ORI, base.0, imm), Class::Prefetch);
        Ok(())
    }

    fn loop_tail(
        &self,
        seq: &mut Seq,
        counter: Gpr,
        at: usize,
        head: usize,
    ) -> Result<(), EmitError> {
        let c = counter.0;
        let near = displacement(at + 4, head);
        let decrement = format::i(OP_IMM, c, funct3::ADD_BEQ, c, -1);
        if (-4096..4096).contains(&near) {
            seq.push_word(decrement, Class::Integer);
            seq.push_word(format::b(OP_BRANCH, funct3::SLL_BNE, c, ZERO, near as i32), Class::Branch);
            return Ok(());
        }
        let far = Self::jal_word(displacement(at + 8, head))?;
        seq.push_word(decrement, Class::Integer);
        seq.push_word(format::b(OP_BRANCH, funct3::ADD_BEQ, c, ZERO, 8), Class::Branch);
        seq.push_word(far, Class::Branch);
        Ok(())
    }

    fn ret(&self, seq: &mut Seq, _alternate: bool) -> Result<(), EmitError> {
        seq.push_word(format::i(OP_JALR, ZERO, funct3::ADD_BEQ, RA, 0), Class::Branch);
        Ok(())
    }
}
