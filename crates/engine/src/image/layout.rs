//! ELF layout parameters per target.

use std::mem::size_of;

use object::elf;
use object::endian::Endianness;

use crate::isa::Isa;

/// Target-dependent constants of the serialized image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    /// `e_machine`.
    pub machine: u16,
    /// `e_flags`.
    pub flags: u32,
    /// ELFCLASS64 when set.
    pub is_64: bool,
    /// Byte order.
    pub endian: Endianness,
}

impl ImageLayout {
    /// Layout of a 64-bit little-endian image for `isa`.
    pub const fn for_isa(isa: Isa) -> Self {
        let (machine, flags) = match isa {
            Isa::X86_64 => (elf::EM_X86_64, 0),
            Isa::Aarch64 => (elf::EM_AARCH64, 0),
            Isa::Rv64 => (elf::EM_RISCV, elf::EF_RISCV_FLOAT_ABI_DOUBLE),
        };
        Self {
            machine,
            flags,
            is_64: true,
            endian: Endianness::Little,
        }
    }

    /// Size of the file header.
    pub const fn header_size(&self) -> usize {
        if self.is_64 {
            size_of::<elf::FileHeader64<Endianness>>()
        } else {
            size_of::<elf::FileHeader32<Endianness>>()
        }
    }

    /// Size of one program header.
    pub const fn program_header_size(&self) -> usize {
        if self.is_64 {
            size_of::<elf::ProgramHeader64<Endianness>>()
        } else {
            size_of::<elf::ProgramHeader32<Endianness>>()
        }
    }

    /// Size of one section header.
    pub const fn section_header_size(&self) -> usize {
        if self.is_64 {
            size_of::<elf::SectionHeader64<Endianness>>()
        } else {
            size_of::<elf::SectionHeader32<Endianness>>()
        }
    }

    /// Size of one symbol table entry.
    pub const fn symbol_size(&self) -> usize {
        if self.is_64 {
            size_of::<elf::Sym64<Endianness>>()
        } else {
            size_of::<elf::Sym32<Endianness>>()
        }
    }

    /// Offset of `e_entry` within the file header.
    pub const fn entry_offset(&self) -> usize {
        24
    }
}
