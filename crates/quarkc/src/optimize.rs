//! Optimizer driver (spec §4.6).
//!
//! Grounded on `emit_and_link`'s pass selection in the `llts_driver`
//! pipeline (`examples/other_examples/..._llts_driver-src-pipeline-compile.rs.rs`):
//! `inkwell::passes::PassBuilderOptions` with a `"default<On>"` preset
//! string run through `Module::run_passes` against a concrete target
//! machine. O0 runs no passes at all.

use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::TargetMachine;

use crate::error::{CompileError, CompileResult};
use crate::options::OptLevel;

/// Runs the standard LLVM pipeline for `level` against `module`, using
/// `machine` for target-specific lowering decisions (spec §4.6: "a standard
/// function-level pipeline ... followed by module-level passes; the exact
/// pipeline is whatever the LLVM builder chooses for that level").
pub fn run(module: &Module<'_>, machine: &TargetMachine, level: OptLevel) -> CompileResult<()> {
    let Some(preset) = preset_for(level) else {
        return Ok(());
    };
    module
        .run_passes(preset, machine, PassBuilderOptions::create())
        .map_err(|err| CompileError::Codegen { span: None, message: err.to_string() })
}

fn preset_for(level: OptLevel) -> Option<&'static str> {
    match level {
        OptLevel::O0 => None,
        OptLevel::O1 => Some("default<O1>"),
        OptLevel::O2 => Some("default<O2>"),
        OptLevel::O3 => Some("default<O3>"),
    }
}
