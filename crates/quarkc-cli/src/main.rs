use std::path::PathBuf;
use std::process::{Command, ExitCode};

use clap::Parser as ClapParser;
use quarkc::{CompileError, CompileOptions, Compiler, EmitKind, OptLevel, Verbosity};

/// Command-line front end for `quarkc` (spec §6 "Command interface").
/// The package-manager surface (`init`/`build`/`clean`/`add`/`remove`/`list`)
/// is a separate out-of-scope collaborator and is not implemented here.
#[derive(ClapParser, Debug)]
#[command(name = "quarkc", version, about = "Ahead-of-time compiler for the Quark language")]
struct Cli {
    /// Source file to compile.
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Subcommand>,

    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,

    #[arg(long)]
    debug: bool,

    #[arg(long = "no-color")]
    no_color: bool,

    #[arg(long = "emit-llvm")]
    emit_llvm: bool,

    #[arg(long = "emit-asm")]
    emit_asm: bool,

    #[arg(short = '0', long = "O0", group = "opt")]
    o0: bool,

    #[arg(short = 'O', group = "opt")]
    o: bool,

    #[arg(long = "O1", group = "opt")]
    o1: bool,

    #[arg(long = "O2", group = "opt")]
    o2: bool,

    #[arg(long = "O3", group = "opt")]
    o3: bool,

    /// Library search path (repeatable).
    #[arg(short = 'L', action = clap::ArgAction::Append)]
    library_paths: Vec<PathBuf>,

    /// Link library (repeatable).
    #[arg(short = 'l', action = clap::ArgAction::Append)]
    link_libraries: Vec<String>,

    #[arg(long)]
    freestanding: bool,

    #[arg(long = "no-cache")]
    no_cache: bool,

    #[arg(long = "clear-cache")]
    clear_cache: bool,

    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Subcommand {
    /// Compiles `FILE` to a temporary executable, runs it, then deletes it
    /// (spec §6 "`run FILE` (compile to a temp, execute, delete)").
    Run { file: PathBuf },
}

/// Deletes the temporary executable on drop even if the child process
/// panics or the run otherwise short-circuits.
struct TempExecutable(PathBuf);

impl Drop for TempExecutable {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.debug {
        Verbosity::Debug
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    let optimize = cli.o0 || cli.o || cli.o1 || cli.o2 || cli.o3;
    let optimization_level = if cli.o3 {
        OptLevel::O3
    } else if cli.o2 {
        OptLevel::O2
    } else if cli.o1 || cli.o {
        OptLevel::O1
    } else {
        OptLevel::O0
    };
    let emit = if cli.emit_asm { EmitKind::Asm } else if cli.emit_llvm { EmitKind::LlvmIr } else { EmitKind::Object };

    match cli.command {
        Some(Subcommand::Run { file }) => run_subcommand(&file, verbosity, emit),
        None => {
            let Some(input) = cli.input else {
                eprintln!("error: no input file given");
                return ExitCode::from(1);
            };
            let mut options = CompileOptions {
                input_path: input,
                optimize,
                optimization_level,
                freestanding: cli.freestanding,
                emit,
                verbosity,
                color_output: !cli.no_color,
                library_paths: cli.library_paths,
                link_libraries: cli.link_libraries,
                use_cache: !cli.no_cache,
                clear_cache: cli.clear_cache,
                ..CompileOptions::default()
            };
            if let Some(output) = cli.output {
                options.output_path = output;
            }
            if let Some(cache_dir) = cli.cache_dir {
                options.cache_dir = cache_dir;
            }
            compile_and_report(&options)
        }
    }
}

fn compile_and_report(options: &CompileOptions) -> ExitCode {
    let mut compiler = Compiler::new();
    match compiler.compile_file(options) {
        Ok(path) => {
            if !matches!(options.verbosity, Verbosity::Quiet) {
                eprintln!("wrote {}", path.display());
            }
            ExitCode::from(0)
        }
        Err(err) => report_failure(&err),
    }
}

fn run_subcommand(file: &PathBuf, verbosity: Verbosity, emit: EmitKind) -> ExitCode {
    let Some(temp_dir) = tempfile::tempdir().ok() else {
        eprintln!("error: could not create a temporary directory");
        return ExitCode::from(2);
    };
    let output_path = temp_dir.path().join("quark_run");
    let options = CompileOptions { input_path: file.clone(), output_path: output_path.clone(), emit, verbosity, ..CompileOptions::default() };

    let mut compiler = Compiler::new();
    let compiled = match compiler.compile_file(&options) {
        Ok(path) => path,
        Err(err) => return report_failure(&err),
    };
    let _guard = TempExecutable(compiled.clone());

    match Command::new(&compiled).status() {
        Ok(status) => ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8),
        Err(err) => {
            eprintln!("error: failed to execute `{}`: {err}", compiled.display());
            ExitCode::from(1)
        }
    }
}

/// Maps the compiler's error taxonomy to the exit codes spec §6 defines: 1
/// for user-visible errors, 2 reserved for internal compiler errors.
fn report_failure(err: &CompileError) -> ExitCode {
    eprintln!("error: {err}");
    match err {
        CompileError::Internal { .. } => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}
