//! Workload construction pipeline.
//!
//! Construction runs once, front to back, with no retries:
//! 1. **Validation:** The characteristic is checked against the line size.
//! 2. **Data:** The pointer-chase chain is built when `data_footprint > 0`.
//! 3. **Code:** The program is generated when there is instruction or FP
//!    work; otherwise a fixed stub becomes the entry point.
//! 4. **Image:** Segments and symbols are recorded in an ELF descriptor.
//! 5. **Preparation:** Host code is made executable and cache coherent;
//!    code for a foreign target is left inspect-only.
//! 6. **Registration:** The image is optionally announced to a debugger.
//!
//! Any failure returns an error; every resource created up to that point is
//! released by its owner's `Drop`.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tracing::{debug, warn};

use crate::characteristic::Characteristic;
use crate::common::{Error, Fault, FaultReporter, Result, page_size, round_up};
use crate::config::EngineConfig;
use crate::emit::{CodeStream, Layout, Tally};
use crate::image::{ImageDescriptor, Registration};
use crate::isa::{Encoder, Isa};
use crate::mem::{Chain, ChainParams, Region, prepare};

use super::program::{self, Plan};
use super::{EntryFn, EntryKind, Liveness, Workload, stubs};

/// Upper bound on the encoded size of one generated instruction sequence.
const MAX_SEQUENCE_BYTES: usize = 16;

/// Fixed sequences outside the units (cursor, value, constants, loop setup).
const FIXED_SEQUENCES: usize = 8;

/// Builds a workload from `characteristic`.
///
/// # Arguments
///
/// * `config` - Line size, target, seed and debugger settings.
/// * `reporter` - Receives clamps and unsupported-encoding faults.
/// * `characteristic` - Shape of the workload; copied into the result.
/// * `id` - Identifier used in logs.
/// * `live` - The engine's live-workload count; the result holds one unit of it.
///
/// # Returns
///
/// The finished workload, or the first error met along the pipeline.
pub fn build(
    config: &EngineConfig,
    reporter: &dyn FaultReporter,
    characteristic: &Characteristic,
    id: u64,
    live: &Arc<AtomicUsize>,
) -> Result<Workload> {
    let line = config.line_size;
    characteristic.validate(line)?;
    let isa = config.target_isa()?;
    let encoder = isa.encoder();
    let chains = clamp_concurrency(encoder, reporter, characteristic);
    debug!(workload = id, isa = ?isa, "building workload");

    let chain = if characteristic.has_data() {
        let chain = Chain::build(&ChainParams {
            footprint: characteristic.data_footprint,
            line,
            dispersion: characteristic.dispersion,
            alignment: characteristic.alignment,
            span: characteristic.slot_span(),
            streaming: characteristic.streaming,
            huge_pages: characteristic.huge_pages,
            seed: config.seed,
            verify: config.verify_chain,
        })?;
        debug!(workload = id, nodes = chain.nodes(), bytes = chain.size(), "chain built");
        Some(chain)
    } else {
        None
    };

    let (code, layout, expected) = if characteristic.has_code() {
        let plan = Plan {
            characteristic,
            line,
            trip: trip_count(config, characteristic),
            chains,
        };
        let (region, layout, tally) = generate(config, encoder, reporter, &plan)?;
        debug!(workload = id, bytes = layout.bytes, branches = layout.branches, "code generated");
        (Some(region), Some(layout), tally)
    } else if chain.is_some() {
        (None, None, stubs::chain_step_tally())
    } else {
        (None, None, stubs::nop_tally())
    };

    let (entry_kind, entry_addr) = match (&code, &layout) {
        (Some(region), Some(layout)) => (EntryKind::Generated, (region.addr() + layout.entry) as u64),
        _ if chain.is_some() => (EntryKind::ChainStep, stubs::CHAIN_STEP as usize as u64),
        _ => (EntryKind::Nop, stubs::NOP as usize as u64),
    };

    let mut image = ImageDescriptor::new(isa, entry_addr);
    if let (Some(region), Some(layout)) = (&code, &layout) {
        let base = region.addr() as u64;
        let text = image.add_code(".text", base, region.as_slice());
        image.add_symbol(
            text,
            "synthload_code",
            base + layout.low as u64,
            (region.len() - layout.low) as u64,
        );
        image.add_symbol(text, "synthload_entry", entry_addr, line as u64);
    }
    if let Some(chain) = &chain {
        let base = chain.base() as u64;
        let data = image.add_data(".data", base, chain.size() as u64);
        image.add_symbol(data, "synthload_chain", base, chain.size() as u64);
    }

    let mut code = code;
    let entry = prepare_entry(isa, entry_kind, &mut code, layout.as_ref())?;
    if entry.is_none() {
        debug!(workload = id, isa = ?isa, "foreign target, workload is inspect-only");
    }

    let registration = if config.register_debugger {
        Some(Registration::register(image.image()?))
    } else {
        None
    };

    debug!(workload = id, kind = ?entry_kind, "workload ready");
    Ok(Workload {
        registration,
        id,
        isa,
        characteristic: characteristic.clone(),
        chains,
        image,
        code,
        layout,
        chain,
        entry,
        entry_kind,
        entry_addr,
        expected,
        _live: Liveness::enter(live),
    })
}

/// Number of FP dependency chains that fit next to the constant register.
fn clamp_concurrency(
    encoder: &dyn Encoder,
    reporter: &dyn FaultReporter,
    characteristic: &Characteristic,
) -> u32 {
    let budget = (encoder.fp_budget().len() - 1) as u32;
    let requested = characteristic.concurrency;
    if requested <= budget {
        return requested;
    }
    warn!(requested, granted = budget, isa = ?encoder.isa(), "concurrency clamped to register budget");
    reporter.report(&Fault::ConcurrencyClamped {
        requested,
        granted: budget,
    });
    budget
}

/// Inner loop trip count.
const fn trip_count(config: &EngineConfig, characteristic: &Characteristic) -> u32 {
    if characteristic.loop_count == 0 {
        config.auto_loop_count
    } else {
        characteristic.loop_count
    }
}

/// Size of the code region for `plan`.
///
/// Lines are assumed half full to absorb stitching branches and the unused
/// tails of lines; slack lines cover the prologue, loop tail and epilogue.
fn code_size(config: &EngineConfig, plan: &Plan<'_>) -> usize {
    let c = plan.characteristic;
    let line = plan.line;
    let unit = (c.fp_intensity as usize + FIXED_SEQUENCES) * MAX_SEQUENCE_BYTES;
    let fixed = (plan.chains as usize + FIXED_SEQUENCES) * MAX_SEQUENCE_BYTES;
    let lines = (c.inst_footprint + unit + fixed).div_ceil(line / 2) + config.prologue_slack_lines;
    round_up(lines * line, page_size())
}

/// Maps a code region and emits the program into it.
fn generate(
    config: &EngineConfig,
    encoder: &'static dyn Encoder,
    reporter: &dyn FaultReporter,
    plan: &Plan<'_>,
) -> Result<(Region, Layout, Tally)> {
    let mut region = Region::map(code_size(config, plan))?;
    let mut tally = Tally::default();
    let layout = {
        let mut stream = CodeStream::new(encoder, region.as_mut_slice(), plan.line, &mut tally)
            .with_alternate(plan.characteristic.alternate_form)
            .with_verbose(config.verbose);
        let generated = program::generate(&mut stream, plan);
        let errors = stream.errors();
        if errors > 0 {
            reporter.report(&Fault::UnsupportedEncodings(errors));
        }
        generated?;
        stream.finish()?
    };
    Ok((region, layout, tally))
}

/// Makes the entry point callable when the workload targets the host.
fn prepare_entry(
    isa: Isa,
    kind: EntryKind,
    code: &mut Option<Region>,
    layout: Option<&Layout>,
) -> Result<Option<EntryFn>> {
    if !isa.is_host() {
        return Ok(None);
    }
    match (kind, code.as_mut(), layout) {
        (EntryKind::Generated, Some(region), Some(layout)) => {
            prepare::make_executable(region)?;
            // SAFETY: `layout.entry` is the first instruction of a complete
            // program for this host following the `EntryFn` convention, and
            // the region is now executable.
            let entry = unsafe {
                std::mem::transmute::<*const u8, EntryFn>(region.as_ptr().add(layout.entry))
            };
            Ok(Some(entry))
        }
        (EntryKind::ChainStep, ..) => Ok(Some(stubs::CHAIN_STEP)),
        (EntryKind::Nop, ..) => Ok(Some(stubs::NOP)),
        (EntryKind::Generated, ..) => Err(Error::invalid("inst_footprint", "generated entry without code")),
    }
}
