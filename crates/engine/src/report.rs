//! Counter reporting.
//!
//! This module turns a workload's expected counts into a report. It provides:
//! 1. **Totals:** Expected counts per call and, given a call count, per run.
//! 2. **Instruction mix:** Each class as a fraction of all instructions.
//! 3. **Memory:** Bytes moved per instruction and per call.
//! 4. **Floating point:** Operations per instruction by precision.
//!
//! The report serializes with `serde` for machine consumption and prints as
//! named sections for humans.

use std::fmt::Write as _;

use serde::Serialize;

use crate::emit::Tally;
use crate::workload::{EntryKind, Workload};

/// Section names for selective output.
///
/// Pass an empty slice to [`CounterReport::print_sections`] to print all sections.
pub const REPORT_SECTIONS: &[&str] = &["summary", "mix", "memory", "fp"];

/// Fractions of all instructions, by class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Mix {
    /// Moves and immediate loads.
    pub moves: f64,
    /// Integer arithmetic.
    pub integer: f64,
    /// Branches.
    pub branches: f64,
    /// Memory barriers.
    pub fences: f64,
    /// Prefetches.
    pub prefetches: f64,
    /// Trace marker hints.
    pub hints: f64,
    /// Memory reads (atomics included).
    pub loads: f64,
    /// Memory writes (atomics included).
    pub stores: f64,
    /// Atomic read-modify-writes.
    pub atomics: f64,
    /// Floating-point instructions.
    pub fp: f64,
}

/// Expected counters of a workload, normalized per expected instruction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CounterReport {
    /// Workload identifier.
    pub workload: u64,
    /// Target name.
    pub isa: &'static str,
    /// Entry point origin.
    pub entry: &'static str,
    /// Entry-point calls the totals are scaled by.
    pub calls: u64,
    /// Expected counts of one call.
    pub per_call: Tally,
    /// `per_call` scaled by `calls`.
    pub total: Tally,
    /// Instruction mix.
    pub mix: Mix,
    /// Bytes read per instruction.
    pub bytes_read_per_instruction: f64,
    /// Bytes written per instruction.
    pub bytes_written_per_instruction: f64,
    /// Half-precision operations per instruction.
    pub flops_half_per_instruction: f64,
    /// Single-precision operations per instruction.
    pub flops_single_per_instruction: f64,
    /// Double-precision operations per instruction.
    pub flops_double_per_instruction: f64,
}

impl CounterReport {
    /// Builds the report of `workload` after `calls` entry-point calls.
    pub fn new(workload: &Workload, calls: u64) -> Self {
        let per_call = *workload.expected();
        let mut total = Tally::default();
        total.add_scaled(&per_call, calls);
        let instr = per_call.instructions.max(1) as f64;
        let ratio = |n: u64| n as f64 / instr;
        Self {
            workload: workload.id(),
            isa: workload.isa().name(),
            entry: match workload.entry_kind() {
                EntryKind::Generated => "generated",
                EntryKind::ChainStep => "chain_step",
                EntryKind::Nop => "nop",
            },
            calls,
            per_call,
            total,
            mix: Mix {
                moves: ratio(per_call.moves),
                integer: ratio(per_call.integer),
                branches: ratio(per_call.branches),
                fences: ratio(per_call.fences),
                prefetches: ratio(per_call.prefetches),
                hints: ratio(per_call.hints),
                loads: ratio(per_call.loads),
                stores: ratio(per_call.stores),
                atomics: ratio(per_call.atomics),
                fp: ratio(per_call.fp_instructions),
            },
            bytes_read_per_instruction: ratio(per_call.bytes_read),
            bytes_written_per_instruction: ratio(per_call.bytes_written),
            flops_half_per_instruction: ratio(per_call.flops_half),
            flops_single_per_instruction: ratio(per_call.flops_single),
            flops_double_per_instruction: ratio(per_call.flops_double),
        }
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Renders the requested sections.
    ///
    /// Each element of `sections` should be one of [`REPORT_SECTIONS`]; an
    /// empty slice renders all of them.
    pub fn render_sections(&self, sections: &[&str]) -> String {
        let want = |s: &str| sections.is_empty() || sections.contains(&s);
        let pct = |f: f64| f * 100.0;
        let p = &self.per_call;
        let mut out = String::new();

        let _ = writeln!(out, "==========================================================");
        let _ = writeln!(out, "SYNTHETIC WORKLOAD COUNTERS");
        let _ = writeln!(out, "==========================================================");
        if want("summary") {
            let _ = writeln!(out, "workload                 {}", self.workload);
            let _ = writeln!(out, "isa                      {}", self.isa);
            let _ = writeln!(out, "entry                    {}", self.entry);
            let _ = writeln!(out, "calls                    {}", self.calls);
            let _ = writeln!(out, "insts_per_call           {}", p.instructions);
            let _ = writeln!(out, "insts_total              {}", self.total.instructions);
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("mix") {
            let m = &self.mix;
            let _ = writeln!(out, "INSTRUCTION MIX");
            let rows = [
                ("op.move", p.moves, m.moves),
                ("op.integer", p.integer, m.integer),
                ("op.branch", p.branches, m.branches),
                ("op.fence", p.fences, m.fences),
                ("op.prefetch", p.prefetches, m.prefetches),
                ("op.hint", p.hints, m.hints),
                ("op.load", p.loads, m.loads),
                ("op.store", p.stores, m.stores),
                ("op.atomic", p.atomics, m.atomics),
                ("op.fp", p.fp_instructions, m.fp),
            ];
            for (name, count, fraction) in rows {
                let _ = writeln!(out, "  {name:<22} {count} ({:.2}%)", pct(fraction));
            }
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("memory") {
            let _ = writeln!(out, "MEMORY");
            let _ = writeln!(out, "  bytes.read             {}", p.bytes_read);
            let _ = writeln!(out, "  bytes.written          {}", p.bytes_written);
            let _ = writeln!(out, "  read_per_inst          {:.4}", self.bytes_read_per_instruction);
            let _ = writeln!(out, "  written_per_inst       {:.4}", self.bytes_written_per_instruction);
            let _ = writeln!(out, "----------------------------------------------------------");
        }
        if want("fp") {
            let _ = writeln!(out, "FLOATING POINT");
            let _ = writeln!(out, "  flops.half             {} ({:.4}/inst)", p.flops_half, self.flops_half_per_instruction);
            let _ = writeln!(out, "  flops.single           {} ({:.4}/inst)", p.flops_single, self.flops_single_per_instruction);
            let _ = writeln!(out, "  flops.double           {} ({:.4}/inst)", p.flops_double, self.flops_double_per_instruction);
        }
        let _ = writeln!(out, "==========================================================");
        out
    }

    /// Prints the requested sections to stdout.
    ///
    /// # Arguments
    ///
    /// * `sections` - Section names from [`REPORT_SECTIONS`], or empty for all.
    pub fn print_sections(&self, sections: &[&str]) {
        print!("{}", self.render_sections(sections));
    }

    /// Prints every section to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
