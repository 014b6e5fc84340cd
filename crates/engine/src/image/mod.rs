//! Executable Image Descriptor.
//!
//! This module describes a workload as a minimal ELF executable so tools can
//! inspect and debug generated code:
//! 1. **Segments:** One `PT_LOAD` program header and one section per region.
//!    Code segments carry their bytes; data segments are `SHT_NOBITS`.
//! 2. **Symbols:** Named address ranges, each inside a registered segment.
//! 3. **Serialization:** Built once on first use and cached; later calls
//!    return the same bytes.
//! 4. **Debugger Registration:** Optional announcement through the GDB JIT
//!    interface (`debugger`).

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use object::elf;
use object::write::StringId;
use object::write::elf::{FileHeader, ProgramHeader, SectionHeader, SectionIndex, Sym, Writer};
use tracing::debug;

use crate::common::Result;
use crate::isa::Isa;

/// GDB JIT interface registration.
pub mod debugger;

/// ELF layout parameters.
pub mod layout;

pub use debugger::Registration;
pub use layout::ImageLayout;

/// Alignment of section payloads in the file.
const PAYLOAD_ALIGN: usize = 16;

/// Kind of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Executable instructions, serialized with their bytes.
    Code,
    /// Writable data, serialized as `SHT_NOBITS`.
    Data,
}

/// A registered address range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Section name, e.g. `.text`.
    pub name: String,
    /// Load address.
    pub addr: u64,
    /// Size in memory.
    pub size: u64,
    /// Code or data.
    pub kind: SegmentKind,
    payload: Option<Vec<u8>>,
}

/// A named address range inside a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Start address.
    pub addr: u64,
    /// Size in bytes.
    pub size: u64,
    /// Index of the containing segment.
    pub segment: usize,
}

/// Segments and symbols of a workload, serializable to ELF.
#[derive(Debug)]
pub struct ImageDescriptor {
    layout: ImageLayout,
    entry: u64,
    segments: Vec<Segment>,
    symbols: Vec<Symbol>,
    image: OnceLock<Vec<u8>>,
}

impl ImageDescriptor {
    /// Creates an empty descriptor for `isa` with entry address `entry`.
    pub fn new(isa: Isa, entry: u64) -> Self {
        Self {
            layout: ImageLayout::for_isa(isa),
            entry,
            segments: Vec::new(),
            symbols: Vec::new(),
            image: OnceLock::new(),
        }
    }

    /// Layout parameters of the image.
    pub const fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Entry address written to `e_entry`.
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Registered segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Registered symbols.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Registers a code segment together with a snapshot of its bytes.
    ///
    /// # Returns
    ///
    /// Index of the new segment.
    pub fn add_code(&mut self, name: &str, addr: u64, bytes: &[u8]) -> usize {
        self.push_segment(Segment {
            name: name.to_owned(),
            addr,
            size: bytes.len() as u64,
            kind: SegmentKind::Code,
            payload: Some(bytes.to_vec()),
        })
    }

    /// Registers a data segment; its contents are not serialized.
    ///
    /// # Returns
    ///
    /// Index of the new segment.
    pub fn add_data(&mut self, name: &str, addr: u64, size: u64) -> usize {
        self.push_segment(Segment {
            name: name.to_owned(),
            addr,
            size,
            kind: SegmentKind::Data,
            payload: None,
        })
    }

    fn push_segment(&mut self, segment: Segment) -> usize {
        assert!(self.image.get().is_none(), "image descriptor is already serialized");
        self.segments.push(segment);
        self.segments.len() - 1
    }

    /// Registers a symbol inside segment `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `segment` was not returned by [`Self::add_code`] or
    /// [`Self::add_data`], if `[addr, addr + size)` is not inside it, or if
    /// the descriptor was already serialized.
    pub fn add_symbol(&mut self, segment: usize, name: &str, addr: u64, size: u64) {
        assert!(self.image.get().is_none(), "image descriptor is already serialized");
        let Some(range) = self.segments.get(segment).map(|s| s.addr..s.addr + s.size) else {
            panic!("symbol `{name}` names unknown segment {segment}");
        };
        assert!(
            addr >= range.start && addr + size <= range.end,
            "symbol `{name}` at {addr:#x}+{size} lies outside segment {segment} [{:#x}, {:#x})",
            range.start,
            range.end
        );
        self.symbols.push(Symbol {
            name: name.to_owned(),
            addr,
            size,
            segment,
        });
    }

    /// Returns the serialized image, building it on the first call.
    ///
    /// # Returns
    ///
    /// The cached ELF bytes, or [`crate::Error::Image`] if serialization failed.
    pub fn image(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.image.get() {
            return Ok(bytes);
        }
        let bytes = self.serialize()?;
        debug!(bytes = bytes.len(), segments = self.segments.len(), "image serialized");
        Ok(self.image.get_or_init(move || bytes))
    }

    /// Returns `true` once the image has been serialized.
    pub fn is_serialized(&self) -> bool {
        self.image.get().is_some()
    }

    /// Writes the serialized image to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.image()?)?;
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        struct Placed {
            name: StringId,
            index: SectionIndex,
            offset: usize,
        }

        let layout = &self.layout;
        let payload: usize = self
            .segments
            .iter()
            .filter_map(|s| s.payload.as_ref())
            .map(Vec::len)
            .sum();
        // Null, symtab, strtab and shstrtab sections besides one per segment.
        let headers = layout.header_size()
            + self.segments.len() * layout.program_header_size()
            + (self.segments.len() + 4) * layout.section_header_size()
            + (self.symbols.len() + 1) * layout.symbol_size();
        let mut out = Vec::with_capacity(headers + payload + self.segments.len() * PAYLOAD_ALIGN);
        let mut writer = Writer::new(self.layout.endian, self.layout.is_64, &mut out);

        writer.reserve_file_header();
        writer.reserve_program_headers(self.segments.len() as u32);
        let _ = writer.reserve_null_section_index();
        let placed: Vec<Placed> = self
            .segments
            .iter()
            .map(|segment| {
                let name = writer.add_section_name(segment.name.as_bytes());
                let index = writer.reserve_section_index();
                let offset = segment
                    .payload
                    .as_ref()
                    .map_or(0, |p| writer.reserve(p.len(), PAYLOAD_ALIGN));
                Placed {
                    name,
                    index,
                    offset,
                }
            })
            .collect();

        let _ = writer.reserve_null_symbol_index();
        let names: Vec<StringId> = self
            .symbols
            .iter()
            .map(|symbol| {
                let name = writer.add_string(symbol.name.as_bytes());
                let _ = writer.reserve_symbol_index(Some(placed[symbol.segment].index));
                name
            })
            .collect();
        let _ = writer.reserve_symtab_section_index();
        writer.reserve_symtab();
        let _ = writer.reserve_strtab_section_index();
        writer.reserve_strtab();
        let _ = writer.reserve_shstrtab_section_index();
        writer.reserve_shstrtab();
        writer.reserve_section_headers();

        writer.write_file_header(&FileHeader {
            os_abi: elf::ELFOSABI_NONE,
            abi_version: 0,
            e_type: elf::ET_EXEC,
            e_machine: self.layout.machine,
            e_entry: self.entry,
            e_flags: self.layout.flags,
        })?;

        writer.write_align_program_headers();
        for (segment, place) in self.segments.iter().zip(&placed) {
            let (flags, filesz) = match &segment.payload {
                Some(payload) => (elf::PF_R | elf::PF_X, payload.len() as u64),
                None => (elf::PF_R | elf::PF_W, 0),
            };
            writer.write_program_header(&ProgramHeader {
                p_type: elf::PT_LOAD,
                p_flags: flags,
                p_offset: place.offset as u64,
                p_vaddr: segment.addr,
                p_paddr: segment.addr,
                p_filesz: filesz,
                p_memsz: segment.size,
                p_align: PAYLOAD_ALIGN as u64,
            });
        }

        for segment in &self.segments {
            if let Some(payload) = &segment.payload {
                writer.write_align(PAYLOAD_ALIGN);
                writer.write(payload);
            }
        }

        writer.write_null_symbol();
        for (symbol, name) in self.symbols.iter().zip(&names) {
            let kind = match self.segments[symbol.segment].kind {
                SegmentKind::Code => elf::STT_FUNC,
                SegmentKind::Data => elf::STT_OBJECT,
            };
            writer.write_symbol(&Sym {
                name: Some(*name),
                section: Some(placed[symbol.segment].index),
                st_info: (elf::STB_GLOBAL << 4) | kind,
                st_other: elf::STV_DEFAULT,
                st_shndx: 0,
                st_value: symbol.addr,
                st_size: symbol.size,
            });
        }
        writer.write_strtab();
        writer.write_shstrtab();

        writer.write_null_section_header();
        for (segment, place) in self.segments.iter().zip(&placed) {
            let (sh_type, sh_flags) = match segment.kind {
                SegmentKind::Code => (elf::SHT_PROGBITS, elf::SHF_ALLOC | elf::SHF_EXECINSTR),
                SegmentKind::Data => (elf::SHT_NOBITS, elf::SHF_ALLOC | elf::SHF_WRITE),
            };
            writer.write_section_header(&SectionHeader {
                name: Some(place.name),
                sh_type,
                sh_flags: u64::from(sh_flags),
                sh_addr: segment.addr,
                sh_offset: place.offset as u64,
                sh_size: segment.size,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: PAYLOAD_ALIGN as u64,
                sh_entsize: 0,
            });
        }
        writer.write_symtab_section_header(1);
        writer.write_strtab_section_header();
        writer.write_shstrtab_section_header();
        debug_assert_eq!(writer.reserved_len(), writer.len());

        Ok(out)
    }
}
