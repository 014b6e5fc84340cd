//! RISC-V Major Opcodes and Function Codes.
//!
//! Defines the major opcodes (bits 6-0) and the function fields used by the
//! encoder. Only the subset the generator emits is listed.

/// Load instructions (LD).
pub const OP_LOAD: u32 = 0b0000011;

/// Memory ordering instructions (FENCE).
pub const OP_MISC_MEM: u32 = 0b0001111;

/// Immediate arithmetic instructions (ADDI, SLLI, ORI).
pub const OP_IMM: u32 = 0b0010011;

/// 32-bit Immediate arithmetic (ADDIW) - RV64 only.
pub const OP_IMM_32: u32 = 0b0011011;

/// Store instructions (SD).
pub const OP_STORE: u32 = 0b0100011;

/// Atomic memory operations (AMOADD.D).
pub const OP_AMO: u32 = 0b0101111;

/// Load Upper Immediate (LUI).
pub const OP_LUI: u32 = 0b0110111;

/// Fused multiply-add (FMADD).
pub const OP_FMADD: u32 = 0b1000011;

/// Fused multiply-subtract (FMSUB).
pub const OP_FMSUB: u32 = 0b1000111;

/// Negated fused multiply-subtract (FNMSUB).
pub const OP_FNMSUB: u32 = 0b1001011;

/// Negated fused multiply-add (FNMADD).
pub const OP_FNMADD: u32 = 0b1001111;

/// Floating-point arithmetic (OP-FP).
pub const OP_FP: u32 = 0b1010011;

/// Conditional Branch instructions (BEQ, BNE).
pub const OP_BRANCH: u32 = 0b1100011;

/// Jump and Link Register (JALR).
pub const OP_JALR: u32 = 0b1100111;

/// Jump and Link (JAL).
pub const OP_JAL: u32 = 0b1101111;

/// `funct3` values.
pub mod funct3 {
    /// ADDI, ADDIW, BEQ, FENCE, JALR.
    pub const ADD_BEQ: u32 = 0b000;
    /// SLLI, BNE.
    pub const SLL_BNE: u32 = 0b001;
    /// LD, SD, AMO*.D.
    pub const DOUBLE: u32 = 0b011;
    /// ORI (prefetch hints are ORI with `rd = x0`).
    pub const ORI: u32 = 0b110;
    /// FSGNJ.
    pub const FSGNJ: u32 = 0b000;
    /// FSGNJN.
    pub const FSGNJN: u32 = 0b001;
    /// Dynamic rounding mode.
    pub const RM_DYN: u32 = 0b111;
}

/// `funct5` values of OP-FP (bits 31-27); the format occupies bits 26-25.
pub mod funct5 {
    /// Floating-point Add.
    pub const FADD: u32 = 0b00000;
    /// Floating-point Subtract.
    pub const FSUB: u32 = 0b00001;
    /// Floating-point Multiply.
    pub const FMUL: u32 = 0b00010;
    /// Floating-point Divide.
    pub const FDIV: u32 = 0b00011;
    /// Floating-point Sign Injection.
    pub const FSGNJ: u32 = 0b00100;
    /// Floating-point Square Root.
    pub const FSQRT: u32 = 0b01011;
    /// Move integer to float.
    pub const FMV_F_X: u32 = 0b11110;
    /// Atomic Add (AMO funct5).
    pub const AMOADD: u32 = 0b00000;
}

/// Floating-point formats (bits 26-25).
pub mod fmt {
    /// Single precision.
    pub const S: u32 = 0b00;
    /// Double precision.
    pub const D: u32 = 0b01;
    /// Half precision (Zfh).
    pub const H: u32 = 0b10;
}

/// FENCE predecessor/successor sets.
pub mod fence {
    /// Reads.
    pub const R: u32 = 0b0010;
    /// Writes.
    pub const W: u32 = 0b0001;
    /// Reads and writes.
    pub const RW: u32 = R | W;
}

/// Zicbop prefetch selectors (the `rs2` field of the ORI hint).
pub mod prefetch {
    /// `prefetch.r`.
    pub const READ: u32 = 0b00001;
}
