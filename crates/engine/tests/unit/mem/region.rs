//! # Region Tests

use synthload_core::common::page_size;
use synthload_core::mem::{Protection, Region};

#[test]
fn test_region_rounds_to_pages() {
    let region = Region::map(1).unwrap();
    assert_eq!(region.len(), page_size());
    assert_eq!(region.addr() % page_size(), 0);
    assert_eq!(region.protection(), Protection::ReadWrite);
    assert!(region.as_slice().iter().all(|&b| b == 0));
}

#[test]
fn test_region_read_write() {
    let mut region = Region::map(4096).unwrap();
    region.write_u64(64, 0xDEAD_BEEF);
    assert_eq!(region.read_u64(64), 0xDEAD_BEEF);
    region.as_mut_slice()[0] = 7;
    assert_eq!(region.as_slice()[0], 7);
}

#[test]
fn test_region_protect_to_execute() {
    let mut region = Region::map(4096).unwrap();
    region.write_u64(0, 42);
    region.protect(Protection::ReadExecute).unwrap();
    assert_eq!(region.protection(), Protection::ReadExecute);
    assert_eq!(region.read_u64(0), 42);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn test_region_read_out_of_bounds_panics() {
    let region = Region::map(4096).unwrap();
    let _ = region.read_u64(region.len());
}

#[test]
#[should_panic(expected = "no longer writable")]
fn test_region_write_after_protect_panics() {
    let mut region = Region::map(4096).unwrap();
    region.protect(Protection::ReadExecute).unwrap();
    region.write_u64(0, 1);
}
