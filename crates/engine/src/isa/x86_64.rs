//! x86-64 encoder.
//!
//! The default form uses legacy SSE encodings (two-operand, destructive). The
//! alternate form uses VEX encodings, which adds three-operand arithmetic,
//! 256-bit vectors and FMA (the AVX2 + FMA3 tier). 512-bit vectors and half
//! precision are never encoded.
//!
//! Generated code follows the System V ABI: every register it touches is
//! caller-saved.

use crate::common::EmitError;

use super::{
    Class, Direction, Encoder, Fence, FpKind, FpOp, Gpr, Isa, MemAccess, Precision, Registers,
    Seq, Vreg, Width, displacement,
};

/// x86-64 encoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct X86_64;

const RAX: Gpr = Gpr(0);
const RCX: Gpr = Gpr(1);
const RDX: Gpr = Gpr(2);
const RSI: Gpr = Gpr(6);
const RDI: Gpr = Gpr(7);
const R8: Gpr = Gpr(8);

static REGISTERS: Registers = Registers {
    arg: RDI,
    cursor: RSI,
    counter: RCX,
    scratch: RAX,
    value: RDX,
    pair: R8,
};

static FP_BUDGET: [Vreg; 16] = [
    Vreg(0),
    Vreg(1),
    Vreg(2),
    Vreg(3),
    Vreg(4),
    Vreg(5),
    Vreg(6),
    Vreg(7),
    Vreg(8),
    Vreg(9),
    Vreg(10),
    Vreg(11),
    Vreg(12),
    Vreg(13),
    Vreg(14),
    Vreg(15),
];

/// `jmp rel32`.
const JMP_LEN: usize = 5;

/// `dec r64` + `jnz rel32`.
const LOOP_TAIL_LEN: usize = 9;

/// `int3`, used to fill unused code bytes.
const INT3: u8 = 0xCC;

mod op {
    pub const MOVAPS: u8 = 0x28;
    pub const SQRT: u8 = 0x51;
    pub const XORPS: u8 = 0x57;
    pub const ADD: u8 = 0x58;
    pub const MUL: u8 = 0x59;
    pub const SUB: u8 = 0x5C;
    pub const DIV: u8 = 0x5E;
    pub const MOVQ_XMM_R64: u8 = 0x6E;
    pub const PSHUFD: u8 = 0x70;
    pub const MOVDDUP: u8 = 0x12;
    pub const DPPS: u8 = 0x40;
    pub const DPPD: u8 = 0x41;
    pub const VBROADCASTSS: u8 = 0x18;
    pub const VBROADCASTSD: u8 = 0x19;
    pub const VFMADD231: u8 = 0xB8;
    pub const VFMSUB231: u8 = 0xBA;
    pub const VFNMADD231: u8 = 0xBC;
    pub const VFNMSUB231: u8 = 0xBE;
}

/// VEX opcode maps.
#[derive(Clone, Copy)]
enum Map {
    M0F = 1,
    M0F38 = 2,
    M0F3A = 3,
}

/// SIMD prefix selector, shared by the legacy prefix byte and VEX.pp.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Pp {
    None = 0,
    P66 = 1,
    PF3 = 2,
    PF2 = 3,
}

impl Pp {
    /// Prefix of an arithmetic instruction on `precision` elements.
    fn arith(precision: Precision, packed: bool) -> Self {
        match (precision, packed) {
            (Precision::Double, true) => Self::P66,
            (Precision::Double, false) => Self::PF2,
            (_, false) => Self::PF3,
            (_, true) => Self::None,
        }
    }

    fn legacy(self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::P66 => Some(0x66),
            Self::PF3 => Some(0xF3),
            Self::PF2 => Some(0xF2),
        }
    }
}

const fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// REX prefix, omitted when it would carry no information.
fn rex(w: bool, r: u8, x: u8, b: u8) -> Option<u8> {
    let byte = 0x40 | (u8::from(w) << 3) | (((r >> 3) & 1) << 2) | (((x >> 3) & 1) << 1) | ((b >> 3) & 1);
    (byte != 0x40).then_some(byte)
}

/// Appends ModRM, optional SIB and displacement for `[base + index + disp]`.
fn address(out: &mut Vec<u8>, reg: u8, base: u8, index: Option<u8>, disp: i32) {
    let (md, disp_len) = if disp == 0 && base & 7 != 5 {
        (0, 0)
    } else if i8::try_from(disp).is_ok() {
        (1, 1)
    } else {
        (2, 4)
    };
    match index {
        Some(idx) => {
            out.push(modrm(md, reg, 4));
            out.push(((idx & 7) << 3) | (base & 7));
        }
        None if base & 7 == 4 => {
            out.push(modrm(md, reg, 4));
            out.push(0x24);
        }
        None => out.push(modrm(md, reg, base)),
    }
    match disp_len {
        1 => out.push(disp.to_le_bytes()[0]),
        4 => out.extend_from_slice(&disp.to_le_bytes()),
        _ => {}
    }
}

/// Legacy SSE register-register form: `[prefix] [REX] 0F <opcode...> ModRM [imm8]`.
fn sse(pp: Pp, w: bool, opcode: &[u8], reg: u8, rm: u8, imm: Option<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend(pp.legacy());
    out.extend(rex(w, reg, 0, rm));
    out.push(0x0F);
    out.extend_from_slice(opcode);
    out.push(modrm(3, reg, rm));
    out.extend(imm);
    out
}

/// VEX register form. Uses the two-byte prefix whenever it can express the fields.
#[allow(clippy::too_many_arguments)]
fn vex(pp: Pp, map: Map, w: bool, l: bool, reg: u8, vvvv: u8, rm: u8, opcode: u8, imm: Option<u8>) -> Vec<u8> {
    let r = (!reg >> 3) & 1;
    let b = (!rm >> 3) & 1;
    let v = !vvvv & 0xF;
    let tail = (v << 3) | (u8::from(l) << 2) | pp as u8;
    let mut out = Vec::with_capacity(6);
    if matches!(map, Map::M0F) && !w && b == 1 {
        out.extend_from_slice(&[0xC5, (r << 7) | tail]);
    } else {
        out.extend_from_slice(&[0xC4, (r << 7) | (1 << 6) | (b << 5) | map as u8, (u8::from(w) << 7) | tail]);
    }
    out.push(opcode);
    out.push(modrm(3, reg, rm));
    out.extend(imm);
    out
}

impl X86_64 {
    /// `dst = src` over the full register.
    fn copy(seq: &mut Seq, dst: u8, src: u8, alternate: bool, l: bool) {
        let bytes = if alternate {
            vex(Pp::None, Map::M0F, false, l, dst, 0, src, op::MOVAPS, None)
        } else {
            sse(Pp::None, false, &[op::MOVAPS], dst, src, None)
        };
        seq.push(&bytes, Class::Move);
    }

    /// Element-wise `dst = s1 <op> s2`.
    #[allow(clippy::too_many_arguments)]
    fn binary(
        seq: &mut Seq,
        opcode: u8,
        pp: Pp,
        l: bool,
        (dst, s1, s2): (u8, u8, u8),
        alternate: bool,
        commutative: bool,
        class: Class,
    ) -> Result<(), EmitError> {
        if alternate {
            seq.push(&vex(pp, Map::M0F, false, l, dst, s1, s2, opcode, None), class);
            return Ok(());
        }
        let rhs = if dst == s1 {
            s2
        } else if dst == s2 && commutative {
            s1
        } else if dst == s2 {
            return Err(EmitError::Unsupported("destructive non-commutative operand order"));
        } else {
            Self::copy(seq, dst, s1, false, false);
            s2
        };
        seq.push(&sse(pp, false, &[opcode], dst, rhs, None), class);
        Ok(())
    }

    fn reduction(seq: &mut Seq, op_: &FpOp, alternate: bool) -> Result<(), EmitError> {
        let terms = op_.kind.terms();
        if op_.width != Width::V128 {
            return Err(EmitError::Unsupported("reductions need 128-bit vectors on x86-64"));
        }
        let (opcode, imm) = match (op_.precision, terms) {
            (Precision::Single, 2) => (op::DPPS, 0x31),
            (Precision::Single, _) => (op::DPPS, 0xF1),
            (Precision::Double, 2) => (op::DPPD, 0x31),
            _ => return Err(EmitError::Unsupported("four-term double reduction on x86-64")),
        };
        let (d, s1, s2) = (op_.dst.0, op_.src(0).0, op_.src(1).0);
        let distance = matches!(op_.kind, FpKind::Dist2 | FpKind::Dist4);
        if !alternate && d != s1 && d == s2 {
            return Err(EmitError::Unsupported("destructive reduction operand order"));
        }
        let sub = Class::Fp {
            precision: op_.precision,
            flops: terms,
        };
        let dot = Class::Fp {
            precision: op_.precision,
            flops: 2 * terms - 1,
        };
        let pp = Pp::arith(op_.precision, true);
        match (distance, alternate) {
            (true, true) => {
                seq.push(&vex(pp, Map::M0F, false, false, d, s1, s2, op::SUB, None), sub);
                seq.push(&vex(Pp::P66, Map::M0F3A, false, false, d, d, d, opcode, Some(imm)), dot);
            }
            (true, false) => {
                if d != s1 {
                    Self::copy(seq, d, s1, false, false);
                }
                seq.push(&sse(pp, false, &[op::SUB], d, s2, None), sub);
                seq.push(&sse(Pp::P66, false, &[0x3A, opcode], d, d, Some(imm)), dot);
            }
            (false, true) => {
                seq.push(&vex(Pp::P66, Map::M0F3A, false, false, d, s1, s2, opcode, Some(imm)), dot);
            }
            (false, false) => {
                if d != s1 {
                    Self::copy(seq, d, s1, false, false);
                }
                seq.push(&sse(Pp::P66, false, &[0x3A, opcode], d, s2, Some(imm)), dot);
            }
        }
        Ok(())
    }
}

impl Encoder for X86_64 {
    fn isa(&self) -> Isa {
        Isa::X86_64
    }

    fn registers(&self) -> &'static Registers {
        &REGISTERS
    }

    fn fp_budget(&self) -> &'static [Vreg] {
        &FP_BUDGET
    }

    fn branch_len(&self) -> usize {
        JMP_LEN
    }

    fn loop_tail_len(&self) -> usize {
        LOOP_TAIL_LEN
    }

    fn fill(&self, buf: &mut [u8]) {
        buf.fill(INT3);
    }

    fn jump(&self, seq: &mut Seq, from: usize, to: usize) -> Result<(), EmitError> {
        let disp = displacement(from + JMP_LEN, to);
        let rel = i32::try_from(disp).map_err(|_| EmitError::BranchRange(disp))?;
        let mut out = vec![0xE9];
        out.extend_from_slice(&rel.to_le_bytes());
        seq.push(&out, Class::Branch);
        Ok(())
    }

    fn fp(&self, seq: &mut Seq, op_: &FpOp, alternate: bool) -> Result<(), EmitError> {
        if op_.precision == Precision::Half {
            return Err(EmitError::Unsupported("half precision on x86-64"));
        }
        let l = match op_.width {
            Width::Scalar | Width::V128 => false,
            Width::V256 if alternate => true,
            Width::V256 => return Err(EmitError::Unsupported("256-bit vectors need VEX")),
            Width::V512 => return Err(EmitError::Unsupported("512-bit vectors on x86-64")),
        };
        let packed = op_.width != Width::Scalar;
        let pp = Pp::arith(op_.precision, packed);
        let lanes = op_.lanes();
        let class = |flops: u32| Class::Fp {
            precision: op_.precision,
            flops: flops * lanes,
        };
        let (d, s1, s2) = (op_.dst.0, op_.src(0).0, op_.src(1).0);
        match op_.kind {
            FpKind::Mov => {
                Self::copy(seq, d, s1, alternate, l);
                Ok(())
            }
            FpKind::Neg => {
                if d == s1 {
                    return Err(EmitError::Unsupported("in-place negation on x86-64"));
                }
                let zero = if alternate {
                    vex(Pp::None, Map::M0F, false, l, d, d, d, op::XORPS, None)
                } else {
                    sse(Pp::None, false, &[op::XORPS], d, d, None)
                };
                seq.push(&zero, Class::Integer);
                let neg = if alternate {
                    vex(pp, Map::M0F, false, l, d, d, s1, op::SUB, None)
                } else {
                    sse(pp, false, &[op::SUB], d, s1, None)
                };
                seq.push(&neg, class(1));
                Ok(())
            }
            FpKind::Add => Self::binary(seq, op::ADD, pp, l, (d, s1, s2), alternate, true, class(1)),
            FpKind::Mul => Self::binary(seq, op::MUL, pp, l, (d, s1, s2), alternate, true, class(1)),
            FpKind::Div => Self::binary(seq, op::DIV, pp, l, (d, s1, s2), alternate, false, class(1)),
            FpKind::Sqrt => {
                let bytes = if alternate {
                    vex(pp, Map::M0F, false, l, d, if packed { 0 } else { s1 }, s1, op::SQRT, None)
                } else {
                    sse(pp, false, &[op::SQRT], d, s1, None)
                };
                seq.push(&bytes, class(1));
                Ok(())
            }
            FpKind::FmAdd | FpKind::FmSub | FpKind::FnmAdd | FpKind::FnmSub => {
                if !alternate {
                    return Err(EmitError::Unsupported("fused multiply-add needs VEX"));
                }
                let base = match op_.kind {
                    FpKind::FmAdd => op::VFMADD231,
                    FpKind::FmSub => op::VFMSUB231,
                    FpKind::FnmAdd => op::VFNMADD231,
                    _ => op::VFNMSUB231,
                };
                let opcode = if packed { base } else { base + 1 };
                let double = op_.precision == Precision::Double;
                seq.push(&vex(Pp::P66, Map::M0F38, double, l, d, s1, s2, opcode, None), class(2));
                Ok(())
            }
            FpKind::Dot2 | FpKind::Dot4 | FpKind::Dist2 | FpKind::Dist4 => {
                Self::reduction(seq, op_, alternate)
            }
        }
    }

    fn load_imm(&self, seq: &mut Seq, rd: Gpr, imm: u64) -> Result<(), EmitError> {
        let r = rd.0;
        let mut out = Vec::with_capacity(10);
        if let Ok(narrow) = u32::try_from(imm) {
            out.extend(rex(false, 0, 0, r));
            out.push(0xB8 + (r & 7));
            out.extend_from_slice(&narrow.to_le_bytes());
        } else {
            out.extend(rex(true, 0, 0, r));
            out.push(0xB8 + (r & 7));
            out.extend_from_slice(&imm.to_le_bytes());
        }
        seq.push(&out, Class::Move);
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
        if precision == Precision::Half {
            return Err(EmitError::Unsupported("half precision on x86-64"));
        }
        let l = match width {
            Width::Scalar | Width::V128 => false,
            Width::V256 if alternate => true,
            Width::V256 => return Err(EmitError::Unsupported("256-bit vectors need VEX")),
            Width::V512 => return Err(EmitError::Unsupported("512-bit vectors on x86-64")),
        };
        let (d, g) = (dst.0, src.0);
        let movq = if alternate {
            vex(Pp::P66, Map::M0F, true, false, d, 0, g, op::MOVQ_XMM_R64, None)
        } else {
            sse(Pp::P66, true, &[op::MOVQ_XMM_R64], d, g, None)
        };
        seq.push(&movq, Class::Move);
        if width == Width::Scalar {
            return Ok(());
        }
        let broadcast = match (alternate, precision, l) {
            (true, Precision::Single, _) => vex(Pp::P66, Map::M0F38, false, l, d, 0, d, op::VBROADCASTSS, None),
            (true, _, true) => vex(Pp::P66, Map::M0F38, false, true, d, 0, d, op::VBROADCASTSD, None),
            (true, _, false) => vex(Pp::PF2, Map::M0F, false, false, d, 0, d, op::MOVDDUP, None),
            (false, Precision::Single, _) => sse(Pp::P66, false, &[op::PSHUFD], d, d, Some(0x00)),
            (false, _, _) => sse(Pp::P66, false, &[op::PSHUFD], d, d, Some(0x44)),
        };
        seq.push(&broadcast, Class::Move);
        Ok(())
    }

    fn mem(&self, seq: &mut Seq, access: &MemAccess, _alternate: bool) -> Result<(), EmitError> {
        access.check()?;
        let f = access.flags;
        if f.paired {
            return Err(EmitError::Unsupported("paired accesses on x86-64"));
        }
        let (reg, base) = (access.reg.0, access.base.0);
        let index = access.index.map(|r| r.0);
        if index == Some(4) {
            return Err(EmitError::Unsupported("rsp as index register"));
        }
        let mut out = Vec::with_capacity(8);
        let class = match access.dir {
            Direction::Load => {
                if f.non_temporal {
                    return Err(EmitError::Unsupported("non-temporal integer loads on x86-64"));
                }
                out.extend(rex(true, reg, index.unwrap_or(0), base));
                out.push(0x8B);
                Class::Load(8)
            }
            Direction::Store if f.atomic => {
                out.push(0xF0);
                out.extend(rex(true, reg, index.unwrap_or(0), base));
                out.push(0x01);
                Class::Atomic(8)
            }
            Direction::Store if f.non_temporal => {
                out.extend(rex(true, reg, index.unwrap_or(0), base));
                out.extend_from_slice(&[0x0F, 0xC3]);
                Class::Store(8)
            }
            Direction::Store => {
                out.extend(rex(true, reg, index.unwrap_or(0), base));
                out.push(0x89);
                Class::Store(8)
            }
        };
        address(&mut out, reg, base, index, access.offset);
        seq.push(&out, class);
        Ok(())
    }

    fn fence(&self, seq: &mut Seq, kind: Fence) -> Result<(), EmitError> {
        let last = match kind {
            Fence::Full => 0xF0,
            Fence::Load => 0xE8,
            Fence::Store => 0xF8,
        };
        seq.push(&[0x0F, 0xAE, last], Class::Fence);
        Ok(())
    }

    fn prefetch(
        &self,
        seq: &mut Seq,
        base: Gpr,
        offset: i32,
        non_temporal: bool,
    ) -> Result<(), EmitError> {
        let mut out = Vec::with_capacity(8);
        out.extend(rex(false, 0, 0, base.0));
        out.extend_from_slice(&[0x0F, 0x18]);
        address(&mut out, u8::from(!non_temporal), base.0, None, offset);
        seq.push(&out, Class::Prefetch);
        Ok(())
    }

    fn loop_tail(
        &self,
        seq: &mut Seq,
        counter: Gpr,
        at: usize,
        head: usize,
    ) -> Result<(), EmitError> {
        let disp = displacement(at + LOOP_TAIL_LEN, head);
        let rel = i32::try_from(disp).map_err(|_| EmitError::BranchRange(disp))?;
        let c = counter.0;
        let mut dec = Vec::with_capacity(3);
        dec.extend(rex(true, 0, 0, c));
        dec.extend_from_slice(&[0xFF, modrm(3, 1, c)]);
        seq.push(&dec, Class::Integer);
        let mut jnz = vec![0x0F, 0x85];
        jnz.extend_from_slice(&rel.to_le_bytes());
        seq.push(&jnz, Class::Branch);
        Ok(())
    }

    fn ret(&self, seq: &mut Seq, alternate: bool) -> Result<(), EmitError> {
        if alternate {
            seq.push(&[0xC5, 0xF8, 0x77], Class::Integer);
        }
        seq.push(&[0xC3], Class::Branch);
        Ok(())
    }
}
