//! Executable emitter (spec §4.7).
//!
//! Grounded on `emit_and_link` in the `llts_driver` pipeline: initialize the
//! native target, create a `TargetMachine` for the host triple, write the
//! module to an object file, then invoke the platform linker as a child
//! process. Freestanding mode passes `-nostdlib` and skips the host C
//! library link.

use std::path::{Path, PathBuf};
use std::process::Command;

use inkwell::module::Module;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;

use crate::error::{CompileError, CompileResult};
use crate::options::{CompileOptions, EmitKind, OptLevel};

fn to_inkwell_opt(level: OptLevel) -> OptimizationLevel {
    match level {
        OptLevel::O0 => OptimizationLevel::None,
        OptLevel::O1 => OptimizationLevel::Less,
        OptLevel::O2 => OptimizationLevel::Default,
        OptLevel::O3 => OptimizationLevel::Aggressive,
    }
}

/// Creates a `TargetMachine` for the host triple (spec §4.7 "invokes the
/// platform linker on the host triple").
pub fn host_machine(level: OptLevel) -> CompileResult<TargetMachine> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|err| CompileError::Internal { message: err.to_string() })?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|err| CompileError::Internal { message: err.to_string() })?;
    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();
    target
        .create_target_machine(&triple, cpu.to_str().unwrap_or("generic"), features.to_str().unwrap_or(""), to_inkwell_opt(level), RelocMode::PIC, CodeModel::Default)
        .ok_or_else(|| CompileError::Internal { message: "failed to create target machine".to_owned() })
}

/// Writes `module` in the form `options.emit` requests and, for object
/// output, links it into the final executable at `options.output_path`
/// (spec §4.7 steps 1-4).
pub fn emit(module: &Module<'_>, machine: &TargetMachine, options: &CompileOptions) -> CompileResult<PathBuf> {
    match options.emit {
        EmitKind::LlvmIr => {
            let ir_path = options.output_path.with_extension("ll");
            std::fs::write(&ir_path, module.print_to_string().to_string()).map_err(|err| CompileError::Io { message: err.to_string() })?;
            Ok(ir_path)
        }
        EmitKind::Asm => {
            let asm_path = options.output_path.with_extension("s");
            machine.write_to_file(module, FileType::Assembly, &asm_path).map_err(|err| CompileError::Io { message: err.to_string() })?;
            Ok(asm_path)
        }
        EmitKind::Object => {
            let obj_path = options.output_path.with_extension("o");
            machine.write_to_file(module, FileType::Object, &obj_path).map_err(|err| CompileError::Io { message: err.to_string() })?;
            link(&obj_path, options)?;
            let _ = std::fs::remove_file(&obj_path);
            Ok(options.output_path.clone())
        }
    }
}

/// Shells out to `cc` (or `$CC`, if set) to turn an object file into an
/// executable, linking the caller-provided search paths and libraries, plus
/// the host C library unless `freestanding` (spec §4.7 step 3; freestanding
/// "links no standard library").
fn link(object_path: &Path, options: &CompileOptions) -> CompileResult<()> {
    let linker = std::env::var("CC").unwrap_or_else(|_| "cc".to_owned());
    let mut command = Command::new(&linker);
    command.arg(object_path).arg("-o").arg(&options.output_path);

    if options.freestanding {
        command.arg("-nostdlib");
    } else {
        command.arg("-lm");
    }
    for path in &options.library_paths {
        command.arg(format!("-L{}", path.display()));
    }
    for lib in &options.link_libraries {
        command.arg(format!("-l{lib}"));
    }

    let output = command.output().map_err(|err| CompileError::Io { message: format!("failed to invoke linker `{linker}`: {err}") })?;
    if !output.status.success() {
        return Err(CompileError::Io { message: format!("linker failed:\n{}", String::from_utf8_lossy(&output.stderr)) });
    }
    Ok(())
}
