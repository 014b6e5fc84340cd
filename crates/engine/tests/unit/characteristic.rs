//! # Characteristic Tests
//!
//! Parsing defaults, field ranges and the checks that depend on the line size.

use pretty_assertions::assert_eq;
use rstest::rstest;
use synthload_core::isa::{FpKind, Precision, Width};
use synthload_core::{Characteristic, Error};

#[test]
fn test_characteristic_defaults() {
    let c = Characteristic::from_json("{}").unwrap();
    assert_eq!(c, Characteristic::default());
    assert_eq!(c.data_offset, 8);
    assert_eq!(c.dispersion, 1);
    assert_eq!(c.alignment, 8);
    assert_eq!(c.concurrency, 1);
    assert_eq!(c.operation, FpKind::Add);
    assert_eq!(c.precision, Precision::Double);
    assert_eq!(c.simd_width, Width::Scalar);
    assert!(!c.has_data());
    assert!(!c.has_code());
}

#[test]
fn test_characteristic_unknown_keys_ignored() {
    let c = Characteristic::from_json(r#"{ "fp_intensity": 2, "colour": "blue" }"#).unwrap();
    assert_eq!(c.fp_intensity, 2);
    assert!(c.has_code());
}

#[test]
fn test_characteristic_parses_enums() {
    let c = Characteristic::from_json(
        r#"{ "operation": "fnmsub", "precision": "fp32", "simd_width": 256 }"#,
    )
    .unwrap();
    assert_eq!(c.operation, FpKind::FnmSub);
    assert_eq!(c.precision, Precision::Single);
    assert_eq!(c.simd_width, Width::V256);
}

#[test]
fn test_characteristic_from_value() {
    let value = serde_json::json!({ "data_footprint": 4096, "store": true });
    let c = Characteristic::from_value(value).unwrap();
    assert!(c.has_data());
    assert!(c.store);
}

#[test]
fn test_characteristic_bad_width_is_parse_error() {
    let err = Characteristic::from_json(r#"{ "simd_width": 100 }"#).unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "{err}");
}

#[rstest]
#[case(r#"{ "dispersion": 0 }"#, "dispersion")]
#[case(r#"{ "alignment": 12 }"#, "alignment")]
#[case(r#"{ "alignment": 4 }"#, "alignment")]
#[case(r#"{ "data_offset": 12 }"#, "data_offset")]
#[case(r#"{ "data_offset": 0 }"#, "data_offset")]
#[case(r#"{ "concurrency": 0 }"#, "concurrency")]
#[case(r#"{ "concurrency": 65 }"#, "concurrency")]
#[case(r#"{ "fp_intensity": 4097 }"#, "fp_intensity")]
#[case(r#"{ "loop_count": 16777217 }"#, "loop_count")]
#[case(r#"{ "store": true }"#, "data_footprint")]
#[case(r#"{ "prefetch": true }"#, "data_footprint")]
fn test_characteristic_field_ranges(#[case] json: &str, #[case] field: &str) {
    let err = Characteristic::from_json(json).unwrap_err();
    match err {
        Error::Validation { field: f, .. } => assert_eq!(f, field),
        other => panic!("expected validation error on {field}, got {other}"),
    }
}

#[test]
fn test_characteristic_chunk_checks() {
    let c = Characteristic {
        data_footprint: 4096,
        data_offset: 56,
        ..Characteristic::default()
    };
    assert!(c.validate_fields().is_ok());
    assert!(matches!(
        c.validate(64),
        Err(Error::Validation { field: "data_offset", .. })
    ));
    // Two lines per chunk leave room behind the pointer.
    let dispersed = Characteristic { dispersion: 2, ..c };
    assert!(dispersed.validate(64).is_ok());
}

#[test]
fn test_characteristic_alignment_exceeding_chunk() {
    let c = Characteristic {
        data_footprint: 4096,
        alignment: 128,
        ..Characteristic::default()
    };
    assert!(matches!(
        c.validate(64),
        Err(Error::Validation { field: "alignment", .. })
    ));
    assert!(c.validate(128).is_ok());
}

#[test]
fn test_characteristic_slot_span() {
    let plain = Characteristic::default();
    assert_eq!(plain.slot_span(), 16);
    let far = Characteristic {
        data_offset: 32,
        ..Characteristic::default()
    };
    assert_eq!(far.slot_span(), 40);
    let paired = Characteristic {
        data_offset: 32,
        paired: true,
        ..Characteristic::default()
    };
    assert_eq!(paired.slot_span(), 48);
}

#[test]
fn test_characteristic_non_temporal_store_is_wide() {
    let near = Characteristic {
        data_footprint: 4096,
        store: true,
        non_temporal: true,
        ..Characteristic::default()
    };
    assert_eq!(near.store_bytes(), 16);
    assert_eq!(near.slot_span(), 24);
    let far = Characteristic {
        data_offset: 32,
        ..near
    };
    assert_eq!(far.slot_span(), 48);
    assert!(far.validate(64).is_ok());

    let narrow = Characteristic {
        non_temporal: false,
        ..far
    };
    assert_eq!(narrow.store_bytes(), 8);
    assert_eq!(narrow.slot_span(), 40);
}

#[test]
fn test_characteristic_memory_flags() {
    let c = Characteristic {
        data_footprint: 4096,
        acquire: true,
        release: true,
        atomic: true,
        non_temporal: true,
        ..Characteristic::default()
    };
    let load = c.load_flags();
    assert!(load.acquire);
    assert!(!load.release);
    assert!(!load.atomic);
    let store = c.store_flags();
    assert!(store.release);
    assert!(store.atomic);
    assert!(!store.acquire);
    assert!(c.any_memory_flag());
}
