//! # Worker Pool Tests
//!
//! Suspension bookkeeping is checked against a set model. The pool itself is
//! only started on hosts that can execute their own target, with stub
//! workloads so that every batch finishes quickly.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use synthload_core::pool::{Suspension, Transition};
use synthload_core::{Characteristic, Engine, Error, Fault, Isa, Owned, Reason, Retired, Workload};

use crate::common::{characteristic, engine_for, foreign_isa, recording_engine};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `done` until it holds or the timeout expires.
fn eventually(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

fn chain_step(engine: &Engine) -> Owned<Workload> {
    engine.build(&characteristic(r#"{ "data_footprint": 4096 }"#)).unwrap()
}

// ──────────────────────────────────────────────────────────
// Suspension
// ──────────────────────────────────────────────────────────

#[test]
fn test_suspension_edges() {
    let mut s = Suspension::default();
    assert!(!s.is_suspended());
    assert_eq!(s.assert(Reason::Explicit), Transition::Park);
    assert_eq!(s.assert(Reason::BuildFailed), Transition::Unchanged);
    assert_eq!(s.assert(Reason::Explicit), Transition::Unchanged);
    assert_eq!(s.retract(Reason::Explicit), Transition::Unchanged);
    assert!(s.contains(Reason::BuildFailed));
    assert_eq!(s.retract(Reason::BuildFailed), Transition::Resume);
    assert_eq!(s.retract(Reason::EmptyAffinity), Transition::Unchanged);
}

fn reason() -> impl Strategy<Value = Reason> {
    prop::sample::select(Reason::ALL.to_vec())
}

proptest! {
    /// The reason set behaves like a set, and only its empty/non-empty edges
    /// produce transitions.
    #[test]
    fn prop_suspension_matches_set(ops in prop::collection::vec((any::<bool>(), reason()), 0..64)) {
        let mut s = Suspension::default();
        let mut model = HashSet::new();
        for (assert, reason) in ops {
            let was_empty = model.is_empty();
            let transition = if assert {
                let _ = model.insert(reason);
                s.assert(reason)
            } else {
                let _ = model.remove(&reason);
                s.retract(reason)
            };
            let expected = match (was_empty, model.is_empty()) {
                (true, false) => Transition::Park,
                (false, true) => Transition::Resume,
                _ => Transition::Unchanged,
            };
            prop_assert_eq!(transition, expected);
            prop_assert_eq!(s.is_suspended(), !model.is_empty());
            for r in Reason::ALL {
                prop_assert_eq!(s.contains(r), model.contains(&r));
            }
        }
    }
}

// ──────────────────────────────────────────────────────────
// Pool
// ──────────────────────────────────────────────────────────

#[test]
fn test_pool_rejects_foreign_workload() {
    let engine = engine_for(foreign_isa());
    let workload = engine.build(&Characteristic::default()).unwrap();
    let err = engine.start(1, workload.share()).unwrap_err();
    assert!(matches!(err, Error::NotRunnable(_)), "{err}");
}

#[test]
fn test_pool_runs_and_swaps() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let first = chain_step(&engine);
    let mut pool = engine.start(2, first.share()).unwrap();
    assert_eq!(pool.len(), 2);
    assert!(eventually(|| pool.iterations().iter().all(|&n| n > 0)));

    let second = engine.build(&Characteristic::default()).unwrap();
    pool.swap(second.share()).unwrap();
    assert_eq!(pool.current().unwrap().id(), second.id());
    assert!(eventually(|| first.shared_count() == 0));
    assert_eq!(first.retire(), Retired::Destroyed);

    let before = pool.total_iterations();
    assert!(eventually(|| pool.total_iterations() > before));
    pool.stop();
    assert_eq!(second.shared_count(), 0);
    assert_eq!(second.retire(), Retired::Destroyed);
}

#[test]
fn test_pool_worker_release_destroys_retired_workload() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let first = chain_step(&engine);
    let first_id = first.id();
    let mut pool = engine.start(2, first.share()).unwrap();
    assert!(eventually(|| pool.iterations().iter().all(|&n| n > 0)));

    // The pool and its workers still hold shared references.
    assert_eq!(first.retire(), Retired::Deferred);
    assert_eq!(engine.live_workloads(), 1);

    let second = chain_step(&engine);
    assert_eq!(engine.live_workloads(), 2);
    pool.swap(second.share()).unwrap();
    assert_ne!(pool.current().unwrap().id(), first_id);
    assert!(eventually(|| engine.live_workloads() == 1));

    pool.stop();
    assert_eq!(second.retire(), Retired::Destroyed);
    assert_eq!(engine.live_workloads(), 0);
}

#[test]
fn test_pool_suspend_and_resume() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let workload = chain_step(&engine);
    let mut pool = engine.start(1, workload.share()).unwrap();

    pool.suspend();
    assert!(pool.is_suspended());
    assert!(pool.suspension().contains(Reason::Explicit));
    // Parked workers let go of the workload.
    assert!(eventually(|| workload.shared_count() == 1));

    pool.suspend_for(Reason::BuildFailed);
    pool.resume();
    assert!(pool.is_suspended(), "another reason is still asserted");
    pool.resume_for(Reason::BuildFailed);
    assert!(!pool.is_suspended());

    let before = pool.total_iterations();
    assert!(eventually(|| pool.total_iterations() > before));
    pool.stop();
}

#[test]
fn test_pool_empty_affinity_suspends() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let workload = chain_step(&engine);
    let mut pool = engine.start(2, workload.share()).unwrap();

    pool.set_affinity(&[]).unwrap();
    assert!(pool.suspension().contains(Reason::EmptyAffinity));

    let every_cpu: Vec<usize> = (0..1024).collect();
    pool.set_affinity(&every_cpu).unwrap();
    assert!(!pool.is_suspended());
    pool.stop();
}

#[test]
fn test_pool_failed_rebuild_suspends_until_success() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let (engine, recorder) = recording_engine(isa);
    let workload = chain_step(&engine);
    let mut pool = engine.start(1, workload.share()).unwrap();
    let broken = Characteristic {
        dispersion: 0,
        ..Characteristic::default()
    };

    let err = pool.rebuild(&engine, &broken).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "dispersion", .. }), "{err}");
    assert!(pool.suspension().contains(Reason::BuildFailed));
    assert!(matches!(recorder.faults().as_slice(), [Fault::BuildFailed(_)]));
    assert_eq!(pool.current().unwrap().id(), workload.id());

    pool.rebuild(&engine, &characteristic(r#"{ "data_footprint": 8192 }"#)).unwrap();
    assert!(!pool.is_suspended());
    assert_ne!(pool.current().unwrap().id(), workload.id());
    pool.stop();
}

#[cfg(target_os = "linux")]
#[test]
fn test_pool_reports_thread_ids() {
    let Some(isa) = Isa::host() else {
        return;
    };
    let engine = engine_for(isa);
    let workload = engine.build(&Characteristic::default()).unwrap();
    let pool = engine.start(3, workload.share()).unwrap();
    let tids = pool.thread_ids();
    assert_eq!(tids.len(), 3);
    assert!(tids.iter().all(|&tid| tid > 0));
    let unique: HashSet<_> = tids.iter().collect();
    assert_eq!(unique.len(), 3);
    pool.stop();
}
