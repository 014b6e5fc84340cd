//! # Workload Construction Tests
//!
//! Builds workloads for every target and checks what the pipeline produced:
//! the entry kind, the regions, the image and the expected per-call counts.
//! Execution is only exercised for the host target.

use pretty_assertions::assert_eq;
use rstest::rstest;
use synthload_core::{
    Characteristic, EmitError, EngineConfig, EntryKind, Error, Fault, Isa, Retired,
};

use crate::common::{
    characteristic, config_for, engine_for, foreign_isa, recording_engine, recording_engine_with,
};

// ──────────────────────────────────────────────────────────
// Stub Bypass
// ──────────────────────────────────────────────────────────

#[test]
fn test_empty_characteristic_uses_nop() {
    let engine = engine_for(Isa::host().unwrap_or(Isa::X86_64));
    let workload = engine.build(&Characteristic::default()).unwrap();
    assert_eq!(workload.entry_kind(), EntryKind::Nop);
    assert!(workload.code().is_none());
    assert!(workload.chain().is_none());
    assert!(workload.initial_cursor().is_null());
    assert!(workload.code_bytes().is_empty());
    assert_eq!(workload.expected().instructions, 1);
    assert_eq!(workload.expected().branches, 1);
}

#[test]
fn test_data_only_uses_chain_step() {
    let engine = engine_for(Isa::host().unwrap_or(Isa::X86_64));
    let workload = engine.build(&characteristic(r#"{ "data_footprint": 4096 }"#)).unwrap();
    assert_eq!(workload.entry_kind(), EntryKind::ChainStep);
    assert!(workload.code().is_none());
    let chain = workload.chain().unwrap();
    assert_eq!(chain.nodes(), 64);
    assert_eq!(workload.initial_cursor(), chain.entry());

    let expected = workload.expected();
    assert_eq!((expected.loads, expected.stores, expected.branches), (2, 1, 1));
}

// ──────────────────────────────────────────────────────────
// Generated Code
// ──────────────────────────────────────────────────────────

#[rstest]
#[case::x86_64(Isa::X86_64)]
#[case::aarch64(Isa::Aarch64)]
#[case::rv64(Isa::Rv64)]
fn test_build_expected_counts(#[case] isa: Isa) {
    let engine = engine_for(isa);
    let c = characteristic(
        r#"{ "inst_footprint": 256, "data_footprint": 65536, "fp_intensity": 2, "loop_count": 1 }"#,
    );
    let workload = engine.build(&c).unwrap();
    assert_eq!(workload.isa(), isa);
    assert_eq!(workload.entry_kind(), EntryKind::Generated);
    assert_eq!(workload.is_runnable(), isa.is_host());
    assert_eq!(workload.chains(), 1);

    let layout = workload.layout().unwrap();
    assert!(layout.bytes >= 256);
    assert!(!workload.code_bytes().is_empty());

    // One chain load per unit plus the cursor load; the cursor store.
    let expected = workload.expected();
    let units = expected.loads - 1;
    assert!(units >= 1);
    assert_eq!(expected.stores, 1);
    assert_eq!(expected.fp_instructions, 2 * units);
    assert_eq!(expected.flops_double, 2 * units);
    assert_eq!(expected.atomics, 0);
    assert!(expected.branches >= 1);
}

#[rstest]
#[case::x86_64(Isa::X86_64)]
#[case::aarch64(Isa::Aarch64)]
#[case::rv64(Isa::Rv64)]
fn test_build_image_symbols(#[case] isa: Isa) {
    let engine = engine_for(isa);
    let c = characteristic(r#"{ "inst_footprint": 128, "data_footprint": 4096, "fp_intensity": 1 }"#);
    let workload = engine.build(&c).unwrap();
    let image = workload.image();
    let names: Vec<_> = image.symbols().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["synthload_code", "synthload_entry", "synthload_chain"]);
    assert_eq!(image.entry(), workload.entry_addr());
    assert!(image.image().is_ok());
}

/// Every store the body emits, at its widest encoding, stays inside the
/// chunk of the pointer it is addressed from.
#[rstest]
#[case::x86_64(Isa::X86_64)]
#[case::aarch64(Isa::Aarch64)]
#[case::rv64(Isa::Rv64)]
fn test_store_stays_inside_its_chunk(#[case] isa: Isa, #[values(8, 24)] data_offset: usize) {
    let engine = engine_for(isa);
    let mut built = 0;
    for bits in 0u32..32 {
        let flag = |n: u32| bits & (1 << n) != 0;
        let c = Characteristic {
            inst_footprint: 64,
            data_footprint: 4096,
            data_offset,
            store: true,
            loop_count: 1,
            non_temporal: flag(0),
            paired: flag(1),
            release: flag(2),
            atomic: flag(3),
            alternate_form: flag(4),
            ..Characteristic::default()
        };
        let workload = match engine.build(&c) {
            Ok(workload) => workload,
            Err(Error::Emit(_)) => continue,
            Err(err) => panic!("{c:?}: {err}"),
        };
        built += 1;

        // The cursor write-back is the only store outside the body.
        let expected = workload.expected();
        let units = expected.stores - 1;
        assert!(units >= 1, "{c:?}");
        let per_store = usize::try_from((expected.bytes_written - 8) / units).unwrap();
        assert!(per_store <= c.store_bytes(), "{c:?}: {per_store} > {}", c.store_bytes());

        let chain = workload.chain().unwrap();
        let chunk = chain.chunk();
        for k in 0..chain.nodes() {
            let slot = chain.slot_offset(k) - k * chunk;
            assert!(
                slot + data_offset + per_store <= chunk,
                "{c:?}: chunk {k} slot {slot} + {data_offset} + {per_store} > {chunk}"
            );
        }
    }
    assert!(built > 0);
}

/// The one-line prefetch distance encodes on every target at the largest line.
#[rstest]
#[case::x86_64(Isa::X86_64)]
#[case::aarch64(Isa::Aarch64)]
#[case::rv64(Isa::Rv64)]
fn test_prefetch_at_largest_line(#[case] isa: Isa) {
    let (engine, recorder) = recording_engine_with(EngineConfig {
        line_size: 1024,
        ..config_for(isa)
    });
    let c = characteristic(
        r#"{ "inst_footprint": 4096, "data_footprint": 65536, "prefetch": true, "loop_count": 1 }"#,
    );
    let workload = engine.build(&c).unwrap();
    assert!(workload.expected().prefetches >= 1);
    assert!(recorder.faults().is_empty());
}

#[test]
fn test_loop_scales_expected_counts() {
    let engine = engine_for(Isa::Aarch64);
    let c = characteristic(
        r#"{ "inst_footprint": 128, "data_footprint": 4096, "fp_intensity": 1, "loop_count": 10 }"#,
    );
    let workload = engine.build(&c).unwrap();
    let expected = workload.expected();
    // Only the cursor load and store sit outside the loop.
    let body_loads = expected.loads - 1;
    assert_eq!(body_loads % 10, 0);
    assert_eq!(expected.fp_instructions, body_loads);
    assert_eq!(expected.stores, 1);
}

#[test]
fn test_foreign_target_is_inspect_only() {
    let isa = foreign_isa();
    let engine = engine_for(isa);
    let workload = engine
        .build(&characteristic(r#"{ "inst_footprint": 64, "fp_intensity": 4 }"#))
        .unwrap();
    assert!(!workload.is_runnable());
    assert!(matches!(workload.entry(), Err(Error::NotRunnable(_))));
    let mut cursor = std::ptr::null_mut();
    assert!(matches!(workload.run(&mut cursor, 1), Err(Error::NotRunnable(_))));
    assert!(!workload.code_bytes().is_empty());
}

#[test]
fn test_unsupported_width_fails_and_reports() {
    let (engine, recorder) = recording_engine(Isa::X86_64);
    let c = characteristic(r#"{ "fp_intensity": 1, "simd_width": 512 }"#);
    let err = engine.build(&c).unwrap_err();
    assert!(matches!(err, Error::Emit(EmitError::Unsupported(_))), "{err}");
    assert_eq!(recorder.faults(), [Fault::UnsupportedEncodings(1)]);
}

#[test]
fn test_concurrency_clamped_to_register_budget() {
    let (engine, recorder) = recording_engine(Isa::X86_64);
    let c = characteristic(r#"{ "fp_intensity": 4, "concurrency": 40 }"#);
    let workload = engine.build(&c).unwrap();
    assert_eq!(workload.chains(), 15);
    assert_eq!(
        recorder.faults(),
        [Fault::ConcurrencyClamped {
            requested: 40,
            granted: 15
        }]
    );
}

#[test]
fn test_chunk_relative_validation() {
    let engine = engine_for(Isa::X86_64);
    let c = Characteristic {
        data_footprint: 4096,
        data_offset: 56,
        store: true,
        ..Characteristic::default()
    };
    let err = engine.build(&c).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "data_offset", .. }), "{err}");
}

#[test]
fn test_engine_counts_live_workloads() {
    let engine = engine_for(Isa::X86_64);
    assert_eq!(engine.live_workloads(), 0);
    let a = engine.build(&characteristic(r#"{ "data_footprint": 4096 }"#)).unwrap();
    let b = engine.build(&Characteristic::default()).unwrap();
    assert_eq!(engine.live_workloads(), 2);

    let shared = a.share();
    assert_eq!(a.retire(), Retired::Deferred);
    assert_eq!(engine.live_workloads(), 2);
    drop(shared);
    assert_eq!(engine.live_workloads(), 1);
    drop(b);
    assert_eq!(engine.live_workloads(), 0);

    // A failed build leaves nothing counted.
    let broken = Characteristic {
        dispersion: 0,
        ..Characteristic::default()
    };
    assert!(engine.build(&broken).is_err());
    assert_eq!(engine.live_workloads(), 0);
}

#[test]
fn test_workload_ids_increase() {
    let engine = engine_for(Isa::X86_64);
    let a = engine.build(&Characteristic::default()).unwrap();
    let b = engine.build(&Characteristic::default()).unwrap();
    assert!(b.id() > a.id());
}

// ──────────────────────────────────────────────────────────
// Host Execution
// ──────────────────────────────────────────────────────────

#[test]
fn test_host_workload_walks_chain() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let c = characteristic(
        r#"{ "inst_footprint": 512, "data_footprint": 65536, "fp_intensity": 2, "loop_count": 4 }"#,
    );
    let workload = engine.build(&c).unwrap();
    assert!(workload.is_runnable());

    let chain = workload.chain().unwrap();
    let range = chain.base()..chain.base() + chain.size();
    let mut cursor = workload.initial_cursor();
    workload.run(&mut cursor, 3).unwrap();
    assert!(range.contains(&(cursor as usize)));
}

#[test]
fn test_host_stub_advances_cursor() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let workload = engine.build(&characteristic(r#"{ "data_footprint": 256 }"#)).unwrap();
    let chain = workload.chain().unwrap();
    let start = workload.initial_cursor();
    let mut cursor = start;
    workload.run(&mut cursor, chain.nodes() as u32).unwrap();
    assert_eq!(cursor, start, "a full lap returns to the entry");
    workload.run(&mut cursor, 1).unwrap();
    assert_ne!(cursor, start);
}

#[test]
fn test_host_store_workload_runs() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let c = characteristic(
        r#"{ "inst_footprint": 256, "data_footprint": 8192, "store": true, "barrier": true,
             "fp_intensity": 1, "operation": "mul", "loop_count": 2 }"#,
    );
    let workload = engine.build(&c).unwrap();
    let mut cursor = workload.initial_cursor();
    workload.run(&mut cursor, 2).unwrap();
    let expected = workload.expected();
    assert_eq!(expected.stores, 1 + (expected.loads - 1));
    assert!(expected.fences >= 2);
}
