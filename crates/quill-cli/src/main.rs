//! `quillc` — the reference CLI driving the Quill runtime.
//!
//! Clap-derive argument parsing plus `tracing_subscriber::fmt`
//! initialization, and an `-i` interactive-after-run loop (wired up in
//! [`repl::run`]).
//!
//! Scanning and parsing are external, out-of-scope collaborators:
//! `quillc` consumes already-parsed `quill_ast::Module`
//! values, JSON-encoded — the same wire convention `quill-bytecode::Code`
//! uses for its own `.qlc` cache files — rather than embedding a frontend
//! of its own. A full Quill distribution would sit a scanner/parser in
//! front of this binary to turn `.ql` source text into that JSON.

mod config;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use quill_ast::Module;
use quill_compiler::{CompileError, OptLevel};
use quill_gc::GcConfig;
use quill_rt::Runtime;
use quill_vm::{Error, Value};
use tracing_subscriber::EnvFilter;

/// Quill: a dynamically-typed, fiber-scheduled scripting runtime.
#[derive(Parser)]
#[command(name = "quill", about = "Quill language runtime", disable_version_flag = true)]
struct Cli {
    /// Entry module: a JSON-encoded `quill_ast::Module` (source-file positional).
    entry: Option<PathBuf>,

    /// Evaluate CMD, a JSON-encoded `quill_ast::Module`, instead of reading a file.
    #[arg(short = 'c', value_name = "CMD")]
    command: Option<String>,

    /// Drop into an interactive REPL after running the entry module.
    #[arg(short = 'i')]
    interactive: bool,

    /// Optimization level : 0 none, 1 jump-thread, 2/3 fold + jump-thread.
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 2)]
    opt_level: u8,

    /// Suppress the startup banner.
    #[arg(short = 'q')]
    quiet: bool,

    /// Flush stdout after every write instead of block-buffering it.
    #[arg(short = 'u')]
    unbuffered: bool,

    /// Disable the tracing collector; rely on reference counting alone.
    #[arg(long)]
    nogc: bool,

    /// Print the full cause chain of an uncaught error.
    #[arg(long)]
    pst: bool,

    /// Print the version and exit.
    #[arg(short = 'v', long, action = clap::ArgAction::SetTrue)]
    version: bool,

    /// Arguments forwarded to the running program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("quill {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    init_tracing();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("quill: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load_config(None)?;

    let threads = max_virtual_cores();
    let search_paths = resolve_search_paths(&cfg);
    let gc_config = resolve_gc_config(&cli, &cfg);
    let unbuffered = cli.unbuffered || std::env::var_os("QUILL_UNBUFFERED").is_some();

    if !cli.quiet {
        let workers = if threads == 0 { "auto".to_string() } else { threads.to_string() };
        println!(
            "Quill {} ({} worker thread(s){})",
            env!("CARGO_PKG_VERSION"),
            workers,
            if cli.nogc { ", gc disabled" } else { "" }
        );
        if unbuffered {
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
    }

    tracing::debug!(?search_paths, trailing_args = ?cli.program_args, "resolved quill invocation");

    let runtime = Runtime::new(threads, gc_config, search_paths, Vec::new());
    let opt_level = OptLevel::from_cli(cli.opt_level.min(3));

    let source = match (&cli.command, &cli.entry) {
        (Some(cmd), _) => Some(cmd.clone()),
        (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?),
        (None, None) => None,
    };

    let mut exit_code = ExitCode::SUCCESS;

    if let Some(source) = source {
        match compile_and_run(&runtime, &source, opt_level) {
            Ok(_) => {}
            Err(RunFailure::Compile(err)) => {
                eprintln!("compile error: {err}");
                exit_code = ExitCode::FAILURE;
            }
            Err(RunFailure::Runtime(err)) => {
                exit_code = report_runtime_error(&err, cli.pst);
            }
        }
    }

    let enter_repl = cli.interactive || (cli.command.is_none() && cli.entry.is_none());
    if enter_repl && exit_code == ExitCode::SUCCESS {
        let startup_path = std::env::var_os("QUILL_STARTUP").map(PathBuf::from).or_else(config::default_startup_script);
        if let Some(startup_path) = startup_path {
            match std::fs::read_to_string(&startup_path) {
                Ok(source) => {
                    if let Err(failure) = compile_and_run(&runtime, &source, opt_level) {
                        eprintln!("quill: error running QUILL_STARTUP ({}): {failure}", startup_path.display());
                    }
                }
                Err(e) => eprintln!("quill: could not read QUILL_STARTUP ({}): {e}", startup_path.display()),
            }
        }
        repl::run(&runtime, cli.quiet);
    }

    Ok(exit_code)
}

enum RunFailure {
    Compile(CompileError),
    Runtime(Error),
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::Compile(e) => write!(f, "{e}"),
            RunFailure::Runtime(e) => write!(f, "{e}"),
        }
    }
}

fn compile_and_run(runtime: &Runtime, source: &str, opt_level: OptLevel) -> Result<Value, RunFailure> {
    let module: Module = serde_json::from_str(source)
        .map_err(|e| RunFailure::Compile(CompileError::internal(format!("not a valid compiled module: {e}"))))?;
    let code = quill_compiler::compile_module(&module, opt_level).map_err(RunFailure::Compile)?;
    runtime.run(Arc::new(code)).map_err(RunFailure::Runtime)
}

/// Report an uncaught error to stderr ; `RuntimeExit` exits the
/// process with its carried code instead of being treated as a failure.
fn report_runtime_error(err: &Error, print_stack_trace: bool) -> ExitCode {
    if err.is_exit() {
        let code: u8 = err.message().parse().unwrap_or(1);
        return ExitCode::from(code);
    }

    eprintln!("error: {}: {}", err.kind(), err.message());
    if print_stack_trace {
        let mut cause = err.cause();
        while let Some(c) = cause {
            eprintln!("caused by: {}: {}", c.kind(), c.message());
            cause = c.cause();
        }
    }
    ExitCode::FAILURE
}

/// `QUILL_MAXVC`: overrides the worker-thread count . `0`
/// (unset or invalid) means "let the scheduler pick the logical CPU count".
fn max_virtual_cores() -> usize {
    std::env::var("QUILL_MAXVC").ok().and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// `QUILLPATH`: an OS-path-separator-delimited module search list,
/// consulted after any `quill.toml` `[modules] search_paths` entries
/// (; ordering documented on `config::ModulesConfig`).
fn resolve_search_paths(cfg: &config::Config) -> Vec<PathBuf> {
    let mut paths = cfg.modules.search_paths.clone();
    if let Some(quillpath) = std::env::var_os("QUILLPATH") {
        paths.extend(std::env::split_paths(&quillpath));
    }
    paths
}

fn resolve_gc_config(cli: &Cli, cfg: &config::Config) -> GcConfig {
    if cli.nogc {
        return GcConfig { thresholds: [usize::MAX; 3], promote_after: [u32::MAX; 3] };
    }
    match cfg.gc.thresholds {
        Some(thresholds) => GcConfig { thresholds, ..GcConfig::default() },
        None => GcConfig::default(),
    }
}
