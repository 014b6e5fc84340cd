//! Instruction Set Targets.
//!
//! Contains the operand vocabulary shared by every target and the [`Encoder`]
//! trait each target implements. Encoders are host-independent: any target can
//! be encoded on any host, only execution requires the target to be the host.
//!
//! # Targets
//!
//! * `x86_64`: SSE legacy forms, VEX (AVX2/FMA) alternate forms.
//! * `aarch64`: Scalar FP and NEON; FP16 and LSE atomics as alternate forms.
//! * `rv64`: Scalar F/D; Zfh as alternate form; AMOs, fences and Zicbop prefetch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::EmitError;

/// AArch64 encoder.
pub mod aarch64;

/// RV64 encoder (opcodes, instruction formats, encoder).
pub mod rv64;

/// Instruction sequence buffer with per-class accounting.
pub mod seq;

/// x86-64 encoder.
pub mod x86_64;

pub use seq::{Class, Seq};

/// Instruction set a workload is generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Isa {
    /// 64-bit x86 (System V calling convention).
    #[serde(alias = "x86-64", alias = "amd64")]
    X86_64,
    /// 64-bit Arm (AAPCS64).
    #[serde(alias = "arm64")]
    Aarch64,
    /// 64-bit RISC-V (LP64D).
    #[serde(alias = "riscv64")]
    Rv64,
}

impl Isa {
    /// Every supported target.
    pub const ALL: [Self; 3] = [Self::X86_64, Self::Aarch64, Self::Rv64];

    /// Returns the target matching the host, if the engine can generate code for it.
    pub const fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else if cfg!(target_arch = "riscv64") {
            Some(Self::Rv64)
        } else {
            None
        }
    }

    /// Returns `true` if code for this target can run on the host.
    pub fn is_host(self) -> bool {
        Self::host() == Some(self)
    }

    /// Short lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Rv64 => "rv64",
        }
    }

    /// Returns the encoder for this target.
    pub fn encoder(self) -> &'static dyn Encoder {
        match self {
            Self::X86_64 => &x86_64::X86_64,
            Self::Aarch64 => &aarch64::Aarch64,
            Self::Rv64 => &rv64::Rv64,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// General-purpose register number in the target's own numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Gpr(pub u8);

/// Floating-point / vector register number in the target's own numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Vreg(pub u8);

/// Floating-point element precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// IEEE binary16.
    #[serde(alias = "fp16")]
    Half,
    /// IEEE binary32.
    #[serde(alias = "fp32")]
    Single,
    /// IEEE binary64.
    #[default]
    #[serde(alias = "fp64")]
    Double,
}

impl Precision {
    /// Element width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Half => 16,
            Self::Single => 32,
            Self::Double => 64,
        }
    }

    /// Bit pattern of `1.0` in this precision, zero-extended.
    pub const fn one(self) -> u64 {
        match self {
            Self::Half => 0x3C00,
            Self::Single => 0x3F80_0000,
            Self::Double => 0x3FF0_0000_0000_0000,
        }
    }
}

/// SIMD register width of a floating-point operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Width {
    /// One element in the low lane.
    #[default]
    Scalar,
    /// 128-bit vector.
    V128,
    /// 256-bit vector.
    V256,
    /// 512-bit vector.
    V512,
}

impl Width {
    /// Number of elements of `precision` one operation processes.
    pub const fn lanes(self, precision: Precision) -> u32 {
        match self {
            Self::Scalar => 1,
            Self::V128 => 128 / precision.bits(),
            Self::V256 => 256 / precision.bits(),
            Self::V512 => 512 / precision.bits(),
        }
    }
}

impl TryFrom<u32> for Width {
    type Error = String;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(Self::Scalar),
            128 => Ok(Self::V128),
            256 => Ok(Self::V256),
            512 => Ok(Self::V512),
            other => Err(format!("SIMD width {other} is not one of 0, 128, 256, 512")),
        }
    }
}

impl From<Width> for u32 {
    fn from(width: Width) -> Self {
        match width {
            Width::Scalar => 0,
            Width::V128 => 128,
            Width::V256 => 256,
            Width::V512 => 512,
        }
    }
}

/// Floating-point operation kinds.
///
/// FMA variants accumulate into the destination:
/// `fmadd: d = s1*s2 + d`, `fmsub: d = s1*s2 - d`,
/// `fnmadd: d = -(s1*s2) + d`, `fnmsub: d = -(s1*s2) - d`.
/// Reductions leave their scalar result in the low lane of the destination:
/// `dotN: d = Σ s1[i]*s2[i]`, `distN: d = Σ (s1[i]-s2[i])²` over `N` lanes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FpKind {
    /// Register copy.
    Mov,
    /// Negation.
    Neg,
    /// Addition.
    #[default]
    Add,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Square root.
    Sqrt,
    /// Fused multiply-add.
    FmAdd,
    /// Fused multiply-subtract.
    FmSub,
    /// Negated fused multiply-add.
    FnmAdd,
    /// Negated fused multiply-subtract.
    FnmSub,
    /// Two-term dot product.
    Dot2,
    /// Four-term dot product.
    Dot4,
    /// Two-term squared distance.
    Dist2,
    /// Four-term squared distance.
    Dist4,
}

impl FpKind {
    /// Number of source operands.
    pub const fn arity(self) -> usize {
        match self {
            Self::Mov | Self::Neg | Self::Sqrt => 1,
            _ => 2,
        }
    }

    /// Number of reduction terms, zero for element-wise operations.
    pub const fn terms(self) -> u32 {
        match self {
            Self::Dot2 | Self::Dist2 => 2,
            Self::Dot4 | Self::Dist4 => 4,
            _ => 0,
        }
    }

    /// Returns `true` for the four fused variants.
    pub const fn is_fused(self) -> bool {
        matches!(self, Self::FmAdd | Self::FmSub | Self::FnmAdd | Self::FnmSub)
    }

    /// Returns `true` if a zero operand keeps recirculating values stable.
    pub const fn is_additive(self) -> bool {
        matches!(self, Self::Add) || self.is_fused()
    }
}

/// One floating-point data-processing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FpOp {
    /// Operation kind.
    pub kind: FpKind,
    /// Element precision.
    pub precision: Precision,
    /// Register width.
    pub width: Width,
    /// Destination (and accumulator for fused kinds).
    pub dst: Vreg,
    srcs: [Vreg; 2],
}

impl FpOp {
    /// Builds an operation; `srcs.len()` must equal `kind.arity()`.
    ///
    /// # Panics
    ///
    /// Panics on an operand-count mismatch; that is a caller bug, not a target limitation.
    pub fn new(kind: FpKind, precision: Precision, width: Width, dst: Vreg, srcs: &[Vreg]) -> Self {
        assert_eq!(
            srcs.len(),
            kind.arity(),
            "{kind:?} takes {} source operands",
            kind.arity()
        );
        let first = srcs[0];
        let second = srcs.get(1).copied().unwrap_or(first);
        Self {
            kind,
            precision,
            width,
            dst,
            srcs: [first, second],
        }
    }

    /// Source operand `i` (the first source is repeated for unary kinds).
    pub const fn src(&self, i: usize) -> Vreg {
        self.srcs[i]
    }

    /// Number of elements processed per instruction.
    pub const fn lanes(&self) -> u32 {
        self.width.lanes(self.precision)
    }
}

/// Direction of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Read into a register.
    Load,
    /// Write from a register.
    Store,
}

/// Ordering and form modifiers of a memory access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemFlags {
    /// Non-temporal hint.
    pub non_temporal: bool,
    /// Two adjacent 64-bit registers.
    pub paired: bool,
    /// Load-acquire ordering.
    pub acquire: bool,
    /// Store-release ordering.
    pub release: bool,
    /// Atomic read-modify-write for stores, single-copy atomic for loads.
    pub atomic: bool,
}

/// One 64-bit memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemAccess {
    /// Load or store.
    pub dir: Direction,
    /// Destination (loads) or source (stores).
    pub reg: Gpr,
    /// Second register of a paired access.
    pub pair: Gpr,
    /// Base address register.
    pub base: Gpr,
    /// Optional index register added to the base.
    pub index: Option<Gpr>,
    /// Byte displacement.
    pub offset: i32,
    /// Form modifiers.
    pub flags: MemFlags,
}

impl MemAccess {
    /// A plain load of `reg` from `[base + offset]`.
    pub const fn load(reg: Gpr, base: Gpr, offset: i32) -> Self {
        Self {
            dir: Direction::Load,
            reg,
            pair: reg,
            base,
            index: None,
            offset,
            flags: MemFlags {
                non_temporal: false,
                paired: false,
                acquire: false,
                release: false,
                atomic: false,
            },
        }
    }

    /// A plain store of `reg` to `[base + offset]`.
    pub const fn store(reg: Gpr, base: Gpr, offset: i32) -> Self {
        let mut access = Self::load(reg, base, offset);
        access.dir = Direction::Store;
        access
    }

    /// Replaces the form modifiers.
    #[must_use]
    pub const fn with_flags(mut self, flags: MemFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the second register used by paired and non-temporal pair forms.
    #[must_use]
    pub const fn with_pair(mut self, pair: Gpr) -> Self {
        self.pair = pair;
        self
    }

    /// Adds an index register.
    #[must_use]
    pub const fn with_index(mut self, index: Gpr) -> Self {
        self.index = Some(index);
        self
    }

    /// Number of bytes transferred.
    pub const fn bytes(&self) -> u32 {
        if self.flags.paired { 16 } else { 8 }
    }

    /// Rejects flag combinations no target can encode.
    pub fn check(&self) -> Result<(), EmitError> {
        let f = self.flags;
        if f.atomic && f.non_temporal {
            return Err(EmitError::Unsupported("atomic access with non-temporal hint"));
        }
        if f.atomic && f.paired {
            return Err(EmitError::Unsupported("paired atomic access"));
        }
        if self.index.is_some() && self.offset != 0 {
            return Err(EmitError::Unsupported("index register together with an offset"));
        }
        if f.acquire && self.dir == Direction::Store {
            return Err(EmitError::Unsupported("acquire ordering on a store"));
        }
        if f.release && self.dir == Direction::Load {
            return Err(EmitError::Unsupported("release ordering on a load"));
        }
        if f.paired && self.pair == self.reg {
            return Err(EmitError::Unsupported("paired access needs two distinct registers"));
        }
        Ok(())
    }
}

/// Memory barrier strength.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fence {
    /// Orders all earlier accesses before all later ones.
    Full,
    /// Orders loads.
    Load,
    /// Orders stores.
    Store,
}

/// Trace marker pseudo-instructions bracketing generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// Start of the region of interest.
    Start,
    /// End of the region of interest.
    Stop,
}

/// Fixed general-purpose register roles used by generated workloads.
///
/// All roles are caller-saved in the target's calling convention, so generated
/// code never needs to spill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    /// First argument: pointer to the caller's chain cursor.
    pub arg: Gpr,
    /// Chain cursor.
    pub cursor: Gpr,
    /// Inner loop counter.
    pub counter: Gpr,
    /// Scratch for immediates and address materialization.
    pub scratch: Gpr,
    /// Value written by stores.
    pub value: Gpr,
    /// Second destination of paired loads.
    pub pair: Gpr,
}

/// Target instruction encoder.
///
/// Every method appends complete instructions to `seq` or returns an error
/// without appending anything. Methods never panic on unsupported combinations.
pub trait Encoder: Send + Sync {
    /// Target of this encoder.
    fn isa(&self) -> Isa;

    /// General-purpose register roles.
    fn registers(&self) -> &'static Registers;

    /// Caller-saved FP/vector registers available for recirculation.
    fn fp_budget(&self) -> &'static [Vreg];

    /// Length in bytes of the unconditional branch used to stitch lines.
    fn branch_len(&self) -> usize;

    /// Upper bound in bytes of [`Encoder::loop_tail`].
    fn loop_tail_len(&self) -> usize;

    /// Fills unused code bytes with a pattern that traps if executed.
    fn fill(&self, buf: &mut [u8]) {
        buf.fill(0);
    }

    /// Unconditional branch located at buffer offset `from` to offset `to`.
    fn jump(&self, seq: &mut Seq, from: usize, to: usize) -> Result<(), EmitError>;

    /// Floating-point data processing.
    fn fp(&self, seq: &mut Seq, op: &FpOp, alternate: bool) -> Result<(), EmitError>;

    /// Loads a 64-bit immediate into `rd`.
    fn load_imm(&self, seq: &mut Seq, rd: Gpr, imm: u64) -> Result<(), EmitError>;

    /// Moves the low bits of `src` into `dst` and broadcasts them to every lane of `width`.
    fn splat(
        &self,
        seq: &mut Seq,
        dst: Vreg,
        src: Gpr,
        precision: Precision,
        width: Width,
        alternate: bool,
    ) -> Result<(), EmitError>;

    /// A 64-bit load or store.
    fn mem(&self, seq: &mut Seq, access: &MemAccess, alternate: bool) -> Result<(), EmitError>;

    /// A memory barrier.
    fn fence(&self, seq: &mut Seq, kind: Fence) -> Result<(), EmitError>;

    /// A data prefetch of `[base + offset]`.
    fn prefetch(
        &self,
        seq: &mut Seq,
        base: Gpr,
        offset: i32,
        non_temporal: bool,
    ) -> Result<(), EmitError>;

    /// Decrements `counter` and branches to `head` while it is non-zero; placed at `at`.
    fn loop_tail(&self, seq: &mut Seq, counter: Gpr, at: usize, head: usize)
    -> Result<(), EmitError>;

    /// Return to the caller.
    fn ret(&self, seq: &mut Seq, alternate: bool) -> Result<(), EmitError>;

    /// Trace marker pseudo-instruction; optional capability.
    fn marker(&self, _seq: &mut Seq, _marker: Marker) -> Result<(), EmitError> {
        Err(EmitError::Unsupported("trace markers"))
    }
}

/// Signed byte distance from `from` to `to`.
#[inline]
pub(crate) fn displacement(from: usize, to: usize) -> i64 {
    to as i64 - from as i64
}
