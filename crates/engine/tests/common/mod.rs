//! Shared helpers for engine tests.

use std::sync::{Arc, Mutex};

use synthload_core::isa::{Isa, Seq};
use synthload_core::{Characteristic, Engine, EngineConfig, Fault, FaultReporter};
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Configuration targeting `isa` with default settings otherwise.
pub fn config_for(isa: Isa) -> EngineConfig {
    EngineConfig {
        isa: Some(isa),
        ..EngineConfig::default()
    }
}

/// Engine targeting `isa` that logs faults.
pub fn engine_for(isa: Isa) -> Engine {
    init_tracing();
    Engine::new(config_for(isa)).expect("default configuration is valid")
}

/// A target the host cannot execute.
pub fn foreign_isa() -> Isa {
    Isa::ALL
        .into_iter()
        .find(|isa| !isa.is_host())
        .expect("at most one target matches the host")
}

/// Parses a characteristic, panicking on malformed test input.
pub fn characteristic(json: &str) -> Characteristic {
    Characteristic::from_json(json).expect("test characteristic is valid")
}

/// Encodes one request with `isa`'s encoder and returns the sequence.
pub fn encode<F>(isa: Isa, f: F) -> Seq
where
    F: FnOnce(&dyn synthload_core::isa::Encoder, &mut Seq) -> Result<(), synthload_core::EmitError>,
{
    let mut seq = Seq::new();
    f(isa.encoder(), &mut seq).expect("encoding is supported");
    seq
}

/// Fault reporter that keeps every fault.
#[derive(Debug, Default)]
pub struct Recorder {
    faults: Mutex<Vec<Fault>>,
}

impl Recorder {
    /// Creates a recorder behind an `Arc`, ready to hand to an engine.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Faults reported so far.
    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().expect("recorder lock").clone()
    }
}

impl FaultReporter for Recorder {
    fn report(&self, fault: &Fault) {
        self.faults.lock().expect("recorder lock").push(fault.clone());
    }
}

/// Engine targeting `isa` whose faults land in the returned recorder.
pub fn recording_engine(isa: Isa) -> (Engine, Arc<Recorder>) {
    recording_engine_with(config_for(isa))
}

/// Engine built from `config` whose faults land in the returned recorder.
pub fn recording_engine_with(config: EngineConfig) -> (Engine, Arc<Recorder>) {
    init_tracing();
    let recorder = Recorder::shared();
    let engine = Engine::with_reporter(config, recorder.clone()).expect("test configuration is valid");
    (engine, recorder)
}
