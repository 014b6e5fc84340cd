//! AArch64 encoder.
//!
//! Scalar FP and 128-bit NEON vectors are encoded in the default form. The
//! alternate form enables FEAT_FP16 scalar arithmetic and FEAT_LSE atomics.
//! Trace markers are `HINT` instructions, architecturally no-ops.
//!
//! Register roles follow AAPCS64: `x0`-`x5` and `v16`-`v31`, `v0`-`v7` are
//! caller-saved; `v8`-`v15` are never touched.

use crate::common::EmitError;

use super::{
    Class, Direction, Encoder, Fence, FpKind, FpOp, Gpr, Isa, Marker, MemAccess, Precision,
    Registers, Seq, Vreg, Width, displacement,
};

/// AArch64 encoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aarch64;

static REGISTERS: Registers = Registers {
    arg: Gpr(0),
    cursor: Gpr(1),
    counter: Gpr(2),
    scratch: Gpr(3),
    value: Gpr(4),
    pair: Gpr(5),
};

static FP_BUDGET: [Vreg; 24] = [
    Vreg(16),
    Vreg(17),
    Vreg(18),
    Vreg(19),
    Vreg(20),
    Vreg(21),
    Vreg(22),
    Vreg(23),
    Vreg(24),
    Vreg(25),
    Vreg(26),
    Vreg(27),
    Vreg(28),
    Vreg(29),
    Vreg(30),
    Vreg(31),
    Vreg(0),
    Vreg(1),
    Vreg(2),
    Vreg(3),
    Vreg(4),
    Vreg(5),
    Vreg(6),
    Vreg(7),
];

mod op {
    pub const FMOV: u32 = 0x1E20_4000;
    pub const FNEG: u32 = 0x1E21_4000;
    pub const FSQRT: u32 = 0x1E21_C000;
    pub const FADD: u32 = 0x1E20_2800;
    pub const FMUL: u32 = 0x1E20_0800;
    pub const FDIV: u32 = 0x1E20_1800;
    pub const FMADD: u32 = 0x1F00_0000;
    pub const FMSUB: u32 = 0x1F00_8000;
    pub const FNMADD: u32 = 0x1F20_0000;
    pub const FNMSUB: u32 = 0x1F20_8000;

    pub const VFADD: u32 = 0x0E20_D400;
    pub const VFSUB: u32 = 0x0EA0_D400;
    pub const VFMUL: u32 = 0x2E20_DC00;
    pub const VFDIV: u32 = 0x2E20_FC00;
    pub const VFSQRT: u32 = 0x2EA1_F800;
    pub const VFNEG: u32 = 0x2EA0_F800;
    pub const VFMLA: u32 = 0x0E20_CC00;
    pub const VFMLS: u32 = 0x0EA0_CC00;
    pub const VFADDP: u32 = 0x2E20_D400;
    pub const FADDP_SCALAR: u32 = 0x7E30_D800;
    pub const VORR: u32 = 0x4EA0_1C00;

    pub const FMOV_S_W: u32 = 0x1E27_0000;
    pub const FMOV_D_X: u32 = 0x9E67_0000;
    pub const FMOV_H_W: u32 = 0x1EE7_0000;
    pub const DUP_4S: u32 = 0x4E04_0C00;
    pub const DUP_2D: u32 = 0x4E08_0C00;

    pub const MOVZ: u32 = 0xD280_0000;
    pub const MOVK: u32 = 0xF280_0000;
    pub const ADD_IMM: u32 = 0x9100_0000;
    pub const SUBS_IMM: u32 = 0xF100_0000;

    pub const LDR_IMM: u32 = 0xF940_0000;
    pub const STR_IMM: u32 = 0xF900_0000;
    pub const LDUR: u32 = 0xF840_0000;
    pub const STUR: u32 = 0xF800_0000;
    pub const LDR_REG: u32 = 0xF860_6800;
    pub const STR_REG: u32 = 0xF820_6800;
    pub const LDAR: u32 = 0xC8DF_FC00;
    pub const STLR: u32 = 0xC89F_FC00;
    pub const LDP: u32 = 0xA940_0000;
    pub const STP: u32 = 0xA900_0000;
    pub const LDNP: u32 = 0xA840_0000;
    pub const STNP: u32 = 0xA800_0000;
    pub const STADD: u32 = 0xF820_001F;
    pub const STADDL: u32 = 0xF860_001F;
    pub const PRFM: u32 = 0xF980_0000;

    pub const DMB_ISH: u32 = 0xD503_3BBF;
    pub const DMB_ISHLD: u32 = 0xD503_39BF;
    pub const DMB_ISHST: u32 = 0xD503_3ABF;
    pub const HINT: u32 = 0xD503_201F;

    pub const B: u32 = 0x1400_0000;
    pub const B_NE: u32 = 0x5400_0001;
    pub const RET: u32 = 0xD65F_03C0;
}

/// `HINT` immediates used as trace markers.
const MARKER_START: u32 = 0x7E;
const MARKER_STOP: u32 = 0x7F;

/// PRFM operations.
const PLDL1KEEP: u32 = 0;
const PLDL1STRM: u32 = 1;

const fn ftype(precision: Precision) -> u32 {
    match precision {
        Precision::Single => 0b00,
        Precision::Double => 0b01,
        Precision::Half => 0b11,
    }
}

const fn scalar2(base: u32, precision: Precision, d: u8, n: u8) -> u32 {
    base | (ftype(precision) << 22) | ((n as u32) << 5) | d as u32
}

const fn scalar3(base: u32, precision: Precision, d: u8, n: u8, m: u8) -> u32 {
    scalar2(base, precision, d, n) | ((m as u32) << 16)
}

/// Vector arrangement: `q` selects 128 bits, `sz` selects 64-bit elements.
#[derive(Clone, Copy)]
struct Arrangement {
    q: u32,
    sz: u32,
}

impl Arrangement {
    const S2: Self = Self { q: 0, sz: 0 };
    const S4: Self = Self { q: 1, sz: 0 };
    const D2: Self = Self { q: 1, sz: 1 };

    const fn full(precision: Precision) -> Self {
        match precision {
            Precision::Double => Self::D2,
            _ => Self::S4,
        }
    }

    const fn encode(self, base: u32, d: u8, n: u8, m: u8) -> u32 {
        base | (self.q << 30) | (self.sz << 22) | ((m as u32) << 16) | ((n as u32) << 5) | d as u32
    }
}

const fn gpr3(base: u32, rt: u8, rn: u8) -> u32 {
    base | ((rn as u32) << 5) | rt as u32
}

impl Aarch64 {
    /// Plain `LDR`/`STR` with the scaled or unscaled immediate form.
    fn ldst(seq: &mut Seq, dir: Direction, rt: u8, rn: u8, offset: i32) -> Result<(), EmitError> {
        let (scaled, unscaled, class) = match dir {
            Direction::Load => (op::LDR_IMM, op::LDUR, Class::Load(8)),
            Direction::Store => (op::STR_IMM, op::STUR, Class::Store(8)),
        };
        let word = if offset >= 0 && offset % 8 == 0 && offset / 8 < 4096 {
            gpr3(scaled, rt, rn) | ((offset as u32 / 8) << 10)
        } else if (-256..256).contains(&offset) {
            gpr3(unscaled, rt, rn) | (((offset as u32) & 0x1FF) << 12)
        } else {
            return Err(EmitError::Unsupported("load/store offset out of range on AArch64"));
        };
        seq.push_word(word, class);
        Ok(())
    }

    /// Returns a register holding `base + offset`, emitting an `ADD` if needed.
    fn materialize(seq: &mut Seq, base: u8, offset: i32) -> Result<u8, EmitError> {
        if offset == 0 {
            return Ok(base);
        }
        if !(1..4096).contains(&offset) {
            return Err(EmitError::Unsupported("ordered access offset out of range on AArch64"));
        }
        let scratch = REGISTERS.scratch.0;
        seq.push_word(gpr3(op::ADD_IMM, scratch, base) | ((offset as u32) << 10), Class::Integer);
        Ok(scratch)
    }

    fn pair_word(base: u32, rt: u8, rt2: u8, rn: u8, offset: i32) -> Result<u32, EmitError> {
        if offset % 8 != 0 || !(-512..=504).contains(&offset) {
            return Err(EmitError::Unsupported("pair offset out of range on AArch64"));
        }
        let imm7 = ((offset / 8) as u32) & 0x7F;
        Ok(gpr3(base, rt, rn) | (imm7 << 15) | ((rt2 as u32) << 10))
    }

    fn reduction(seq: &mut Seq, op_: &FpOp) -> Result<(), EmitError> {
        if op_.width != Width::V128 {
            return Err(EmitError::Unsupported("reductions need 128-bit vectors on AArch64"));
        }
        let terms = op_.kind.terms();
        let arrangement = match (op_.precision, terms) {
            (Precision::Single, 2) => Arrangement::S2,
            (Precision::Single, _) => Arrangement::S4,
            (Precision::Double, 2) => Arrangement::D2,
            (Precision::Double, _) => {
                return Err(EmitError::Unsupported("four-term double reduction on AArch64"));
            }
            (Precision::Half, _) => {
                return Err(EmitError::Unsupported("half-precision vectors on AArch64"));
            }
        };
        let precision = op_.precision;
        let fp = |flops| Class::Fp { precision, flops };
        let (d, s1, s2) = (op_.dst.0, op_.src(0).0, op_.src(1).0);
        if matches!(op_.kind, FpKind::Dist2 | FpKind::Dist4) {
            seq.push_word(arrangement.encode(op::VFSUB, d, s1, s2), fp(terms));
            seq.push_word(arrangement.encode(op::VFMUL, d, d, d), fp(terms));
        } else {
            seq.push_word(arrangement.encode(op::VFMUL, d, s1, s2), fp(terms));
        }
        if terms == 4 {
            seq.push_word(arrangement.encode(op::VFADDP, d, d, d), fp(2));
        }
        seq.push_word(
            op::FADDP_SCALAR | (arrangement.sz << 22) | ((d as u32) << 5) | d as u32,
            fp(1),
        );
        Ok(())
    }
}

impl Encoder for Aarch64 {
    fn isa(&self) -> Isa {
        Isa::Aarch64
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
        8
    }

    fn jump(&self, seq: &mut Seq, from: usize, to: usize) -> Result<(), EmitError> {
        let disp = displacement(from, to);
        if disp % 4 != 0 || !(-(1 << 27)..(1 << 27)).contains(&disp) {
            return Err(EmitError::BranchRange(disp));
        }
        seq.push_word(op::B | (((disp / 4) as u32) & 0x03FF_FFFF), Class::Branch);
        Ok(())
    }

    fn fp(&self, seq: &mut Seq, op_: &FpOp, alternate: bool) -> Result<(), EmitError> {
        let precision = op_.precision;
        match op_.width {
            Width::Scalar | Width::V128 => {}
            Width::V256 | Width::V512 => {
                return Err(EmitError::Unsupported("vectors wider than 128 bits on AArch64"));
            }
        }
        let vector = op_.width == Width::V128;
        if precision == Precision::Half {
            if vector {
                return Err(EmitError::Unsupported("half-precision vectors on AArch64"));
            }
            if !alternate {
                return Err(EmitError::Unsupported("half precision needs FEAT_FP16"));
            }
        }
        let lanes = op_.lanes();
        let class = |flops: u32| Class::Fp {
            precision,
            flops: flops * lanes,
        };
        let arrangement = Arrangement::full(precision);
        let (d, s1, s2) = (op_.dst.0, op_.src(0).0, op_.src(1).0);
        let word = match (op_.kind, vector) {
            (FpKind::Mov, false) => {
                seq.push_word(scalar2(op::FMOV, precision, d, s1), Class::Move);
                return Ok(());
            }
            (FpKind::Mov, true) => {
                seq.push_word(op::VORR | ((s1 as u32) << 16) | ((s1 as u32) << 5) | d as u32, Class::Move);
                return Ok(());
            }
            (FpKind::Neg, false) => scalar2(op::FNEG, precision, d, s1),
            (FpKind::Neg, true) => arrangement.encode(op::VFNEG, d, s1, 0),
            (FpKind::Sqrt, false) => scalar2(op::FSQRT, precision, d, s1),
            (FpKind::Sqrt, true) => arrangement.encode(op::VFSQRT, d, s1, 0),
            (FpKind::Add, false) => scalar3(op::FADD, precision, d, s1, s2),
            (FpKind::Add, true) => arrangement.encode(op::VFADD, d, s1, s2),
            (FpKind::Mul, false) => scalar3(op::FMUL, precision, d, s1, s2),
            (FpKind::Mul, true) => arrangement.encode(op::VFMUL, d, s1, s2),
            (FpKind::Div, false) => scalar3(op::FDIV, precision, d, s1, s2),
            (FpKind::Div, true) => arrangement.encode(op::VFDIV, d, s1, s2),
            (FpKind::FmAdd | FpKind::FmSub | FpKind::FnmAdd | FpKind::FnmSub, false) => {
                // AArch64 names the accumulator sign differently: FNMSUB is n*m - a.
                let base = match op_.kind {
                    FpKind::FmAdd => op::FMADD,
                    FpKind::FmSub => op::FNMSUB,
                    FpKind::FnmAdd => op::FMSUB,
                    _ => op::FNMADD,
                };
                seq.push_word(scalar3(base, precision, d, s1, s2) | ((d as u32) << 10), class(2));
                return Ok(());
            }
            (FpKind::FmAdd, true) => {
                seq.push_word(arrangement.encode(op::VFMLA, d, s1, s2), class(2));
                return Ok(());
            }
            (FpKind::FnmAdd, true) => {
                seq.push_word(arrangement.encode(op::VFMLS, d, s1, s2), class(2));
                return Ok(());
            }
            (FpKind::FmSub | FpKind::FnmSub, true) => {
                return Err(EmitError::Unsupported("vector FMA with negated accumulator on AArch64"));
            }
            (FpKind::Dot2 | FpKind::Dot4 | FpKind::Dist2 | FpKind::Dist4, _) => {
                return Self::reduction(seq, op_);
            }
        };
        seq.push_word(word, class(1));
        Ok(())
    }

    fn load_imm(&self, seq: &mut Seq, rd: Gpr, imm: u64) -> Result<(), EmitError> {
        let chunks = (0..4u32).map(|hw| (hw, ((imm >> (hw * 16)) & 0xFFFF) as u32));
        let mut first = true;
        for (hw, chunk) in chunks {
            if chunk == 0 && !(first && hw == 3) {
                continue;
            }
            let base = if first { op::MOVZ } else { op::MOVK };
            seq.push_word(base | (hw << 21) | (chunk << 5) | u32::from(rd.0), Class::Move);
            first = false;
        }
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
        let (d, g) = (u32::from(dst.0), u32::from(src.0));
        let word = match (precision, width) {
            (_, Width::V256 | Width::V512) => {
                return Err(EmitError::Unsupported("vectors wider than 128 bits on AArch64"));
            }
            (Precision::Half, Width::V128) => {
                return Err(EmitError::Unsupported("half-precision vectors on AArch64"));
            }
            (Precision::Half, Width::Scalar) if !alternate => {
                return Err(EmitError::Unsupported("half precision needs FEAT_FP16"));
            }
            (Precision::Half, Width::Scalar) => op::FMOV_H_W,
            (Precision::Single, Width::Scalar) => op::FMOV_S_W,
            (Precision::Double, Width::Scalar) => op::FMOV_D_X,
            (Precision::Single, Width::V128) => op::DUP_4S,
            (Precision::Double, Width::V128) => op::DUP_2D,
        };
        seq.push_word(word | (g << 5) | d, Class::Move);
        Ok(())
    }

    fn mem(&self, seq: &mut Seq, access: &MemAccess, alternate: bool) -> Result<(), EmitError> {
        access.check()?;
        let f = access.flags;
        let (rt, rn, rt2) = (access.reg.0, access.base.0, access.pair.0);
        if let Some(index) = access.index {
            if f.paired || f.acquire || f.release || f.atomic || f.non_temporal {
                return Err(EmitError::Unsupported("register offset with ordering or pair form"));
            }
            let (base, class) = match access.dir {
                Direction::Load => (op::LDR_REG, Class::Load(8)),
                Direction::Store => (op::STR_REG, Class::Store(8)),
            };
            seq.push_word(gpr3(base, rt, rn) | (u32::from(index.0) << 16), class);
            return Ok(());
        }
        match access.dir {
            Direction::Load if f.acquire => {
                if f.paired || f.non_temporal {
                    return Err(EmitError::Unsupported("acquire on a pair load"));
                }
                let base = Self::materialize(seq, rn, access.offset)?;
                seq.push_word(gpr3(op::LDAR, rt, base), Class::Load(8));
            }
            Direction::Load if f.paired || f.non_temporal => {
                let base = if f.non_temporal { op::LDNP } else { op::LDP };
                let second = if f.paired { rt2 } else { REGISTERS.pair.0 };
                if second == rt {
                    return Err(EmitError::Unsupported("pair load into one register"));
                }
                let word = Self::pair_word(base, rt, second, rn, access.offset)?;
                seq.push_word(word, Class::Load(16));
            }
            Direction::Load => Self::ldst(seq, Direction::Load, rt, rn, access.offset)?,
            Direction::Store if f.atomic => {
                if !alternate {
                    return Err(EmitError::Unsupported("atomics need FEAT_LSE"));
                }
                let base = Self::materialize(seq, rn, access.offset)?;
                let opcode = if f.release { op::STADDL } else { op::STADD };
                seq.push_word(opcode | (u32::from(rt) << 16) | (u32::from(base) << 5), Class::Atomic(8));
            }
            Direction::Store if f.release => {
                if f.paired || f.non_temporal {
                    return Err(EmitError::Unsupported("release on a pair store"));
                }
                let base = Self::materialize(seq, rn, access.offset)?;
                seq.push_word(gpr3(op::STLR, rt, base), Class::Store(8));
            }
            Direction::Store if f.paired || f.non_temporal => {
                let base = if f.non_temporal { op::STNP } else { op::STP };
                let second = if f.paired { rt2 } else { rt };
                let word = Self::pair_word(base, rt, second, rn, access.offset)?;
                seq.push_word(word, Class::Store(16));
            }
            Direction::Store => Self::ldst(seq, Direction::Store, rt, rn, access.offset)?,
        }
        Ok(())
    }

    fn fence(&self, seq: &mut Seq, kind: Fence) -> Result<(), EmitError> {
        let word = match kind {
            Fence::Full => op::DMB_ISH,
            Fence::Load => op::DMB_ISHLD,
            Fence::Store => op::DMB_ISHST,
        };
        seq.push_word(word, Class::Fence);
        Ok(())
    }

    fn prefetch(
        &self,
        seq: &mut Seq,
        base: Gpr,
        offset: i32,
        non_temporal: bool,
    ) -> Result<(), EmitError> {
        if offset < 0 || offset % 8 != 0 || offset / 8 >= 4096 {
            return Err(EmitError::Unsupported("prefetch offset out of range on AArch64"));
        }
        let prfop = if non_temporal { PLDL1STRM } else { PLDL1KEEP };
        seq.push_word(
            gpr3(op::PRFM, 0, base.0) | ((offset as u32 / 8) << 10) | prfop,
            Class::Prefetch,
        );
        Ok(())
    }

    fn loop_tail(
        &self,
        seq: &mut Seq,
        counter: Gpr,
        at: usize,
        head: usize,
    ) -> Result<(), EmitError> {
        let disp = displacement(at + 4, head);
        if !(-(1 << 20)..(1 << 20)).contains(&disp) {
            return Err(EmitError::BranchRange(disp));
        }
        let c = counter.0;
        seq.push_word(gpr3(op::SUBS_IMM, c, c) | (1 << 10), Class::Integer);
        seq.push_word(op::B_NE | ((((disp / 4) as u32) & 0x7FFFF) << 5), Class::Branch);
        Ok(())
    }

    fn ret(&self, seq: &mut Seq, _alternate: bool) -> Result<(), EmitError> {
        seq.push_word(op::RET, Class::Branch);
        Ok(())
    }

    fn marker(&self, seq: &mut Seq, marker: Marker) -> Result<(), EmitError> {
        let imm = match marker {
            Marker::Start => MARKER_START,
            Marker::Stop => MARKER_STOP,
        };
        seq.push_word(op::HINT | (imm << 5), Class::Hint);
        Ok(())
    }
}
