//! RISC-V instruction formats.
//!
//! Assemblers for the R, R4, I, S, B, U and J formats. Immediates are passed as
//! signed values and truncated into their fields; range checks belong to the
//! caller.

/// R-type: `funct7 | rs2 | rs1 | funct3 | rd | opcode`.
pub const fn r(opcode: u32, rd: u8, funct3: u32, rs1: u8, rs2: u8, funct7: u32) -> u32 {
    (funct7 << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | opcode
}

/// R4-type: `rs3 | fmt | rs2 | rs1 | rm | rd | opcode`.
pub const fn r4(opcode: u32, rd: u8, rm: u32, rs1: u8, rs2: u8, rs3: u8, fmt: u32) -> u32 {
    ((rs3 as u32) << 27) | (fmt << 25) | r(opcode, rd, rm, rs1, rs2, 0)
}

/// I-type: `imm[11:0] | rs1 | funct3 | rd | opcode`.
pub const fn i(opcode: u32, rd: u8, funct3: u32, rs1: u8, imm: i32) -> u32 {
    (((imm as u32) & 0xFFF) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | opcode
}

/// S-type: `imm[11:5] | rs2 | rs1 | funct3 | imm[4:0] | opcode`.
pub const fn s(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 5) & 0x7F) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((imm & 0x1F) << 7)
        | opcode
}

/// B-type: `imm[12|10:5] | rs2 | rs1 | funct3 | imm[4:1|11] | opcode`.
pub const fn b(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 12) & 1) << 31)
        | (((imm >> 5) & 0x3F) << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xF) << 8)
        | (((imm >> 11) & 1) << 7)
        | opcode
}

/// U-type: `imm[31:12] | rd | opcode`.
pub const fn u(opcode: u32, rd: u8, imm20: u32) -> u32 {
    ((imm20 & 0xF_FFFF) << 12) | ((rd as u32) << 7) | opcode
}

/// J-type: `imm[20|10:1|11|19:12] | rd | opcode`.
pub const fn j(opcode: u32, rd: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (((imm >> 20) & 1) << 31)
        | (((imm >> 1) & 0x3FF) << 21)
        | (((imm >> 11) & 1) << 20)
        | (((imm >> 12) & 0xFF) << 12)
        | ((rd as u32) << 7)
        | opcode
}
