//! Compile-time options shared by the CLI, the embedding interface, and the
//! compilation cache's fingerprint (spec §6).
//!
//! Mirrors the teacher's convention of a single `pub`, `Clone` options
//! struct threaded into the driver rather than a pile of loose parameters;
//! generalized here to also be `serde`-serializable, since the embedding
//! interface and the cache manifest both need to round-trip it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Optimization level requested for the LLVM pass pipeline (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptLevel {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::O0 => 0,
            Self::O1 => 1,
            Self::O2 => 2,
            Self::O3 => 3,
        }
    }
}

impl Default for OptLevel {
    fn default() -> Self {
        Self::O0
    }
}

/// How much diagnostic chatter the terminal sink should show (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

/// What kind of IR artifact the emitter should produce before linking
/// (spec §6 `--emit-llvm`/`--emit-asm`; object code is the implicit default
/// when neither flag is given).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
pub enum EmitKind {
    #[default]
    LlvmIr,
    Asm,
    Object,
}

/// Every field the command interface and the embedding interface can set,
/// and every field the cache fingerprint depends on (spec §6, §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub optimize: bool,
    pub optimization_level: OptLevel,
    pub freestanding: bool,
    pub emit: EmitKind,
    pub verbosity: Verbosity,
    pub color_output: bool,
    pub library_paths: Vec<PathBuf>,
    pub link_libraries: Vec<String>,
    pub use_cache: bool,
    pub clear_cache: bool,
    pub cache_dir: PathBuf,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: PathBuf::from(default_output_name()),
            optimize: false,
            optimization_level: OptLevel::O0,
            freestanding: false,
            emit: EmitKind::Object,
            verbosity: Verbosity::Normal,
            color_output: true,
            library_paths: Vec::new(),
            link_libraries: Vec::new(),
            use_cache: true,
            clear_cache: false,
            cache_dir: PathBuf::from(".quark_cache"),
        }
    }
}

impl CompileOptions {
    /// The effective optimization level: `-O0` unless `optimize` is set, in
    /// which case `optimization_level` applies (spec §6 `-O`/`-O1..3` imply
    /// `optimize`, but a caller may set the level directly too).
    #[must_use]
    pub fn effective_opt_level(&self) -> OptLevel {
        if self.optimize {
            self.optimization_level
        } else {
            OptLevel::O0
        }
    }

    /// Fields that can change the emitted bitcode, concatenated for hashing
    /// by the compilation cache (spec §4.9: optimization level and
    /// freestanding flag are part of an entry's validity check).
    #[must_use]
    pub fn fingerprint_fields(&self) -> String {
        format!("{}|{}", self.effective_opt_level().as_u8(), self.freestanding)
    }
}

#[must_use]
pub fn default_output_name() -> &'static str {
    if cfg!(windows) {
        "main.exe"
    } else {
        "main"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_opt_level_falls_back_to_o0_when_optimize_is_off() {
        let mut options = CompileOptions { optimize: false, optimization_level: OptLevel::O3, ..Default::default() };
        assert_eq!(options.effective_opt_level(), OptLevel::O0);
        options.optimize = true;
        assert_eq!(options.effective_opt_level(), OptLevel::O3);
    }

    #[test]
    fn options_round_trip_through_json() {
        let options = CompileOptions::default();
        let text = serde_json::to_string(&options).expect("serialize");
        let back: CompileOptions = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(options, back);
    }
}
