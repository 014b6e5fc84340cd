//! # Image Descriptor Tests
//!
//! The serialized image is checked at the byte level against the ELF64
//! header layout.

use pretty_assertions::assert_eq;
use rstest::rstest;
use synthload_core::image::{ImageDescriptor, Registration, SegmentKind};
use synthload_core::isa::Isa;

const CODE_ADDR: u64 = 0x1000;
const DATA_ADDR: u64 = 0x10_0000;

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn descriptor(isa: Isa) -> ImageDescriptor {
    let mut image = ImageDescriptor::new(isa, CODE_ADDR + 0x40);
    let code = image.add_code(".text", CODE_ADDR, &[0xAB; 128]);
    let data = image.add_data(".data", DATA_ADDR, 1 << 20);
    assert_eq!((code, data), (0, 1));
    image.add_symbol(code, "synthload_entry", CODE_ADDR + 0x40, 64);
    image.add_symbol(data, "synthload_chain", DATA_ADDR, 1 << 20);
    image
}

#[rstest]
#[case::x86_64(Isa::X86_64, 62)]
#[case::aarch64(Isa::Aarch64, 183)]
#[case::rv64(Isa::Rv64, 243)]
fn test_image_header(#[case] isa: Isa, #[case] machine: u16) {
    let image = descriptor(isa);
    let bytes = image.image().unwrap();
    assert_eq!(&bytes[..4], b"\x7FELF");
    assert_eq!(bytes[4], 2, "ELFCLASS64");
    assert_eq!(bytes[5], 1, "little endian");
    assert_eq!(u16_at(bytes, 16), 2, "ET_EXEC");
    assert_eq!(u16_at(bytes, 18), machine);
    assert_eq!(u64_at(bytes, 24), CODE_ADDR + 0x40);
    assert_eq!(u16_at(bytes, 56), 2, "one program header per segment");
    // Null, two segments, symtab, strtab, shstrtab.
    assert_eq!(u16_at(bytes, 60), 6);
}

#[rstest]
#[case::x86_64(Isa::X86_64)]
#[case::aarch64(Isa::Aarch64)]
#[case::rv64(Isa::Rv64)]
fn test_image_layout_matches_headers(#[case] isa: Isa) {
    let image = descriptor(isa);
    let layout = *image.layout();
    let bytes = image.image().unwrap();
    assert_eq!(usize::from(u16_at(bytes, 52)), layout.header_size(), "e_ehsize");
    assert_eq!(usize::from(u16_at(bytes, 54)), layout.program_header_size(), "e_phentsize");
    assert_eq!(usize::from(u16_at(bytes, 58)), layout.section_header_size(), "e_shentsize");
    assert_eq!(u64_at(bytes, layout.entry_offset()), image.entry());
    assert_eq!(u64_at(bytes, 32), layout.header_size() as u64, "program headers follow the header");

    let shoff = usize::try_from(u64_at(bytes, 40)).unwrap();
    let shnum = usize::from(u16_at(bytes, 60));
    let symtab = (0..shnum)
        .map(|i| shoff + i * layout.section_header_size())
        .find(|&at| u32_at(bytes, at + 4) == 2)
        .expect("SHT_SYMTAB section header");
    assert_eq!(u64_at(bytes, symtab + 56), layout.symbol_size() as u64, "sh_entsize");
    // Null symbol plus the two registered ones.
    assert_eq!(u64_at(bytes, symtab + 32), 3 * layout.symbol_size() as u64, "sh_size");
}

#[test]
fn test_image_carries_code_but_not_data() {
    let image = descriptor(Isa::X86_64);
    let bytes = image.image().unwrap();
    assert!(contains(bytes, &[0xAB; 128]));
    // A 1 MiB data segment serializes as NOBITS, so the file stays small.
    assert!(bytes.len() < 4096);
    assert!(contains(bytes, b"synthload_entry"));
    assert!(contains(bytes, b"synthload_chain"));
    assert!(contains(bytes, b".text"));
}

#[test]
fn test_image_is_built_once() {
    let image = descriptor(Isa::Aarch64);
    assert!(!image.is_serialized());
    let first = image.image().unwrap().as_ptr();
    assert!(image.is_serialized());
    let second = image.image().unwrap().as_ptr();
    assert_eq!(first, second);
}

#[test]
fn test_image_segments_and_symbols() {
    let image = descriptor(Isa::Rv64);
    assert_eq!(image.segments()[0].kind, SegmentKind::Code);
    assert_eq!(image.segments()[1].kind, SegmentKind::Data);
    assert_eq!(image.symbols()[1].segment, 1);
    assert_eq!(image.entry(), CODE_ADDR + 0x40);
}

#[test]
#[should_panic(expected = "outside segment 0")]
fn test_image_symbol_outside_segments_panics() {
    let mut image = descriptor(Isa::X86_64);
    image.add_symbol(0, "stray", CODE_ADDR + 120, 16);
}

#[test]
#[should_panic(expected = "outside segment 1")]
fn test_image_symbol_in_wrong_segment_panics() {
    let mut image = descriptor(Isa::X86_64);
    // Inside `.text`, but attributed to `.data`.
    image.add_symbol(1, "misplaced", CODE_ADDR, 16);
}

#[test]
#[should_panic(expected = "unknown segment 2")]
fn test_image_symbol_unknown_segment_panics() {
    let mut image = descriptor(Isa::X86_64);
    image.add_symbol(2, "orphan", CODE_ADDR, 16);
}

#[test]
fn test_image_symbols_keep_their_segment() {
    let mut image = ImageDescriptor::new(Isa::Aarch64, CODE_ADDR);
    let data = image.add_data(".data", DATA_ADDR, 4096);
    let code = image.add_code(".text", CODE_ADDR, &[0; 64]);
    assert_eq!((data, code), (0, 1));
    image.add_symbol(code, "entry", CODE_ADDR, 64);
    image.add_symbol(data, "chain", DATA_ADDR + 64, 64);
    let segments: Vec<_> = image.symbols().iter().map(|s| s.segment).collect();
    assert_eq!(segments, [code, data]);
    assert!(image.image().is_ok());
}

#[test]
#[should_panic(expected = "already serialized")]
fn test_image_frozen_after_serialization() {
    let mut image = descriptor(Isa::X86_64);
    let _ = image.image().unwrap();
    let _ = image.add_data(".bss", 0x20_0000, 64);
}

#[test]
fn test_image_write_to_file() {
    let image = descriptor(Isa::X86_64);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.elf");
    image.write_to(&path).unwrap();
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written.as_slice(), image.image().unwrap());
}

#[test]
fn test_registration_lifecycle() {
    let image = descriptor(Isa::X86_64);
    let registration = Registration::register(image.image().unwrap());
    assert_eq!(registration.is_active(), cfg!(feature = "gdb-jit"));
    let second = Registration::register(image.image().unwrap());
    drop(registration);
    drop(second);
}
