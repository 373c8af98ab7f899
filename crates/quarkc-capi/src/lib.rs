//! C ABI for embedding `quarkc` in non-Rust hosts.
//!
//! Grounded on `examples/original_source/include/compiler_api.h`: every
//! type and function name below mirrors that header's `Quark*`/`quark_*`
//! surface, translated into the `quarkc` crate's `Compiler`/`CompileOptions`
//! API (spec §6 "Embedding interface").

use std::ffi::{CStr, CString, c_void};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use quarkc::diagnostics::CallbackSink;
use quarkc::{CompileError, CompileOptions, CompileStatus, Compiler, Diagnostic, EmitKind, OptLevel, Severity, Verbosity};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarkCompileStatus {
    Ok = 0,
    ErrInvalidArgument = -1,
    ErrIo = -2,
    ErrCompilation = -3,
    ErrInternal = -4,
}

impl From<CompileStatus> for QuarkCompileStatus {
    fn from(status: CompileStatus) -> Self {
        match status {
            CompileStatus::Ok => Self::Ok,
            CompileStatus::InvalidArgument => Self::ErrInvalidArgument,
            CompileStatus::Io => Self::ErrIo,
            CompileStatus::Compilation => Self::ErrCompilation,
            CompileStatus::Internal => Self::ErrInternal,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarkLogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Success = 4,
    Progress = 5,
}

impl From<Severity> for QuarkLogLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Debug => Self::Debug,
            Severity::Info => Self::Info,
            Severity::Warning => Self::Warning,
            Severity::Error => Self::Error,
            Severity::Success => Self::Success,
            Severity::Progress => Self::Progress,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarkVerbosityLevel {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
    Debug = 3,
}

/// Layout must stay byte-for-byte compatible with `QuarkCompilerOptions` in
/// `compiler_api.h`: field order and width are part of the ABI.
#[repr(C)]
pub struct QuarkCompilerOptions {
    pub input_path: *const c_char,
    pub output_path: *const c_char,
    pub optimize: c_int,
    pub optimization_level: c_int,
    pub freestanding: c_int,
    pub emit_llvm: c_int,
    pub emit_asm: c_int,
    pub verbosity: c_int,
    pub color_output: c_int,
    pub library_paths: *const *const c_char,
    pub library_path_count: usize,
    pub link_libraries: *const *const c_char,
    pub link_library_count: usize,
    pub use_cache: c_int,
    pub clear_cache: c_int,
    pub cache_dir: *const c_char,
}

pub struct QuarkCompilerHandle {
    compiler: Compiler,
}

pub type QuarkDiagnosticCallback = extern "C" fn(QuarkLogLevel, *const c_char, c_int, *mut c_void);
pub type QuarkRawOutputCallback = extern "C" fn(*const c_char, c_int, *mut c_void);

/// # Safety
/// `ptr` must be null or point to a valid NUL-terminated C string that
/// outlives this call.
unsafe fn cstr_to_pathbuf(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller guarantees `ptr` is a valid NUL-terminated C string.
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    Some(PathBuf::from(text))
}

/// # Safety
/// `ptr` must be null or point to an array of `count` valid NUL-terminated
/// C strings.
unsafe fn cstr_array_to_vec(ptr: *const *const c_char, count: usize) -> Vec<String> {
    if ptr.is_null() || count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        // SAFETY: caller guarantees `ptr` points to an array of at least
        // `count` valid string pointers.
        let entry = unsafe { *ptr.add(index) };
        if entry.is_null() {
            continue;
        }
        // SAFETY: `entry` is a non-null element of the caller-guaranteed array.
        let text = unsafe { CStr::from_ptr(entry) }.to_string_lossy().into_owned();
        out.push(text);
    }
    out
}

fn opt_level_from_i32(level: c_int) -> OptLevel {
    match level {
        1 => OptLevel::O1,
        2 => OptLevel::O2,
        3 => OptLevel::O3,
        _ => OptLevel::O0,
    }
}

fn verbosity_from_i32(level: c_int) -> Verbosity {
    match level {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        3 => Verbosity::Debug,
        _ => Verbosity::Normal,
    }
}

fn emit_kind_from_flags(emit_llvm: c_int, emit_asm: c_int) -> EmitKind {
    if emit_asm != 0 {
        EmitKind::Asm
    } else if emit_llvm != 0 {
        EmitKind::LlvmIr
    } else {
        EmitKind::Object
    }
}

/// # Safety
/// `raw` must point to a `QuarkCompilerOptions` whose pointer fields are
/// either null or valid for the duration of this call, per
/// `compiler_api.h`'s contract.
unsafe fn options_from_c(raw: &QuarkCompilerOptions) -> CompileOptions {
    // SAFETY: delegated to `options_from_c`'s own safety contract.
    let input_path = unsafe { cstr_to_pathbuf(raw.input_path) }.unwrap_or_default();
    // SAFETY: see above.
    let output_path = unsafe { cstr_to_pathbuf(raw.output_path) };
    // SAFETY: see above.
    let cache_dir = unsafe { cstr_to_pathbuf(raw.cache_dir) };
    // SAFETY: see above.
    let library_paths = unsafe { cstr_array_to_vec(raw.library_paths, raw.library_path_count) }
        .into_iter()
        .map(PathBuf::from)
        .collect();
    // SAFETY: see above.
    let link_libraries = unsafe { cstr_array_to_vec(raw.link_libraries, raw.link_library_count) };

    let mut options = CompileOptions {
        input_path,
        optimize: raw.optimize != 0,
        optimization_level: opt_level_from_i32(raw.optimization_level),
        freestanding: raw.freestanding != 0,
        emit: emit_kind_from_flags(raw.emit_llvm, raw.emit_asm),
        verbosity: verbosity_from_i32(raw.verbosity),
        color_output: raw.color_output != 0,
        library_paths,
        link_libraries,
        use_cache: raw.use_cache != 0,
        clear_cache: raw.clear_cache != 0,
        ..CompileOptions::default()
    };
    if let Some(output_path) = output_path {
        options.output_path = output_path;
    }
    if let Some(cache_dir) = cache_dir {
        options.cache_dir = cache_dir;
    }
    options
}

fn status_of(result: &Result<PathBuf, CompileError>) -> c_int {
    match result {
        Ok(_) => QuarkCompileStatus::Ok as c_int,
        Err(err) => QuarkCompileStatus::from(CompileStatus::from(err)) as c_int,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn quark_compiler_create() -> *mut QuarkCompilerHandle {
    Box::into_raw(Box::new(QuarkCompilerHandle { compiler: Compiler::new() }))
}

/// # Safety
/// `handle` must be null or a pointer previously returned by
/// `quark_compiler_create` that has not already been destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_destroy(handle: *mut QuarkCompilerHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: caller guarantees `handle` came from `quark_compiler_create`
    // and has not already been destroyed.
    drop(unsafe { Box::from_raw(handle) });
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`. `callback`,
/// if non-null, must remain valid for every future diagnostic emitted by
/// `handle` until a new callback is installed or `handle` is destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_set_diagnostic_callback(handle: *mut QuarkCompilerHandle, callback: Option<QuarkDiagnosticCallback>, user_data: *mut c_void) {
    // SAFETY: caller guarantees `handle` is live.
    let Some(handle) = (unsafe { handle.as_mut() }) else { return };
    let Some(callback) = callback else { return };
    let user_data = user_data as usize;
    handle.compiler.set_diagnostic_sink(Box::new(CallbackSink::new(move |diagnostic: &Diagnostic| {
        let message = CString::new(diagnostic.message.as_str()).unwrap_or_default();
        callback(diagnostic.severity.into(), message.as_ptr(), c_int::from(diagnostic.newline), user_data as *mut c_void);
    })));
}

/// # Safety
/// Same contract as `quark_compiler_set_diagnostic_callback`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_set_raw_output_callback(handle: *mut QuarkCompilerHandle, callback: Option<QuarkRawOutputCallback>, user_data: *mut c_void) {
    // SAFETY: caller guarantees `handle` is live.
    let Some(handle) = (unsafe { handle.as_mut() }) else { return };
    let Some(callback) = callback else { return };
    let user_data = user_data as usize;
    handle.compiler.set_raw_sink(Box::new(move |text: &str, newline: bool| {
        let text = CString::new(text).unwrap_or_default();
        callback(text.as_ptr(), c_int::from(newline), user_data as *mut c_void);
    }));
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_set_console_echo(handle: *mut QuarkCompilerHandle, enabled: c_int) {
    // SAFETY: caller guarantees `handle` is live.
    let Some(handle) = (unsafe { handle.as_mut() }) else { return };
    handle.compiler.set_console_echo(enabled != 0);
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`; `options`
/// must point to a valid `QuarkCompilerOptions` per its own field contracts.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_compile_file(handle: *mut QuarkCompilerHandle, options: *const QuarkCompilerOptions) -> c_int {
    // SAFETY: caller guarantees `handle` is live.
    let Some(handle) = (unsafe { handle.as_mut() }) else { return QuarkCompileStatus::ErrInvalidArgument as c_int };
    // SAFETY: caller guarantees `options` is a valid pointer.
    let Some(options) = (unsafe { options.as_ref() }) else { return QuarkCompileStatus::ErrInvalidArgument as c_int };
    // SAFETY: delegated to `options_from_c`'s contract, upheld by this function's caller.
    let options = unsafe { options_from_c(options) };
    let result = handle.compiler.compile_file(&options);
    status_of(&result)
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`; `source_text`
/// and `virtual_filename` must be valid NUL-terminated C strings; `options`
/// must point to a valid `QuarkCompilerOptions`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_compile_source(handle: *mut QuarkCompilerHandle, source_text: *const c_char, virtual_filename: *const c_char, options: *const QuarkCompilerOptions) -> c_int {
    // SAFETY: caller guarantees `handle` is live.
    let Some(handle) = (unsafe { handle.as_mut() }) else { return QuarkCompileStatus::ErrInvalidArgument as c_int };
    if source_text.is_null() || virtual_filename.is_null() {
        return QuarkCompileStatus::ErrInvalidArgument as c_int;
    }
    // SAFETY: caller guarantees `source_text` is a valid NUL-terminated C string.
    let source_text = unsafe { CStr::from_ptr(source_text) }.to_string_lossy().into_owned();
    // SAFETY: caller guarantees `virtual_filename` is a valid NUL-terminated C string.
    let virtual_filename = unsafe { CStr::from_ptr(virtual_filename) }.to_string_lossy().into_owned();
    // SAFETY: caller guarantees `options` is a valid pointer.
    let Some(options) = (unsafe { options.as_ref() }) else { return QuarkCompileStatus::ErrInvalidArgument as c_int };
    // SAFETY: delegated to `options_from_c`'s contract, upheld by this function's caller.
    let options = unsafe { options_from_c(options) };
    let result = handle.compiler.compile_source(&source_text, &virtual_filename, &options);
    status_of(&result)
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_get_error_count(handle: *const QuarkCompilerHandle) -> c_int {
    // SAFETY: caller guarantees `handle` is live.
    (unsafe { handle.as_ref() }).map_or(0, |handle| handle.compiler.error_count() as c_int)
}

/// # Safety
/// `handle` must be a live pointer from `quark_compiler_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_compiler_get_warning_count(handle: *const QuarkCompilerHandle) -> c_int {
    // SAFETY: caller guarantees `handle` is live.
    (unsafe { handle.as_ref() }).map_or(0, |handle| handle.compiler.warning_count() as c_int)
}

static LAST_COUNTS: Mutex<(usize, usize)> = Mutex::new((0, 0));

/// Stateless convenience wrapper for direct CLI integrations that don't want
/// to manage a `QuarkCompilerHandle` (spec §6, `compiler_api.h`'s "CLI
/// convenience helpers").
///
/// # Safety
/// `input_path` must be a valid NUL-terminated C string; `output_path`, if
/// non-null, must also be one.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quark_cli_compile_file(
    input_path: *const c_char,
    output_path: *const c_char,
    optimize: c_int,
    optimization_level: c_int,
    freestanding: c_int,
    emit_llvm: c_int,
    emit_asm: c_int,
    verbosity: c_int,
    color_output: c_int,
) -> c_int {
    // SAFETY: caller guarantees `input_path` is a valid NUL-terminated C string.
    let Some(input_path) = (unsafe { cstr_to_pathbuf(input_path) }) else {
        return QuarkCompileStatus::ErrInvalidArgument as c_int;
    };
    let mut options = CompileOptions {
        input_path,
        optimize: optimize != 0,
        optimization_level: opt_level_from_i32(optimization_level),
        freestanding: freestanding != 0,
        emit: emit_kind_from_flags(emit_llvm, emit_asm),
        verbosity: verbosity_from_i32(verbosity),
        color_output: color_output != 0,
        ..CompileOptions::default()
    };
    // SAFETY: caller guarantees `output_path` is null or a valid NUL-terminated C string.
    if let Some(path) = unsafe { cstr_to_pathbuf(output_path) } {
        options.output_path = path;
    }

    let mut compiler = Compiler::new();
    let result = compiler.compile_file(&options);
    if let Ok(mut counts) = LAST_COUNTS.lock() {
        *counts = (compiler.error_count(), compiler.warning_count());
    }
    status_of(&result)
}

#[unsafe(no_mangle)]
pub extern "C" fn quark_cli_last_error_count() -> c_int {
    LAST_COUNTS.lock().map_or(0, |counts| counts.0 as c_int)
}

#[unsafe(no_mangle)]
pub extern "C" fn quark_cli_last_warning_count() -> c_int {
    LAST_COUNTS.lock().map_or(0, |counts| counts.1 as c_int)
}

#[unsafe(no_mangle)]
pub extern "C" fn quark_cli_default_output() -> *const c_char {
    static DEFAULT: OnceLock<CString> = OnceLock::new();
    DEFAULT.get_or_init(|| CString::new(quarkc::options::default_output_name()).unwrap_or_default()).as_ptr()
}
