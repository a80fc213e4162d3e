//! fax-drv - the CLI Driver
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! Binds the whole pipeline together behind the `fax` executable:
//! `fax` with no argument drops into an interactive REPL, `fax <path>` runs a
//! script file, and anything else is a usage error. Argument parsing goes
//! through `clap`; everything below it is just `fax_vm::Vm::interpret` plus
//! the exit-code mapping below.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use fax_util::FaxError;
use fax_vm::Vm;

/// Compile error exit code.
pub const EXIT_COMPILE_ERROR: u8 = 65;
/// Runtime error exit code.
pub const EXIT_RUNTIME_ERROR: u8 = 70;
/// CLI usage error exit code (extra arguments).
pub const EXIT_USAGE_ERROR: u8 = 64;
/// Script file could not be read.
pub const EXIT_IO_ERROR: u8 = 74;

/// `fax [path] [--trace-gc] [--stress-gc] [--trace]`
#[derive(Parser, Debug)]
#[command(name = "fax", version, about = "A bytecode interpreter for the Fax scripting language")]
pub struct Cli {
    /// Script to run. Omitted to start the interactive REPL.
    paths: Vec<PathBuf>,

    /// Log every GC cycle (mark/blacken/free) at trace level.
    #[arg(long)]
    pub trace_gc: bool,

    /// Run a collection before every allocation, to shake out missing roots.
    #[arg(long)]
    pub stress_gc: bool,

    /// Log each executed instruction and the stack before it runs.
    #[arg(long)]
    pub trace: bool,
}

/// Runs the CLI end to end and returns the process exit code. `main.rs` is
/// just `ExitCode::from(fax_drv::run(Cli::parse()))`-shaped; kept here,
/// rather than inlined in `main`, so `assert_cmd` integration tests can also
/// drive it through the compiled binary without duplicating this logic.
pub fn run(cli: Cli) -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if cli.paths.len() > 1 {
        eprintln!("Usage: fax [path]");
        return ExitCode::from(EXIT_USAGE_ERROR);
    }

    let mut vm = Vm::new();
    vm.set_trace_gc(cli.trace_gc);
    vm.set_stress_gc(cli.stress_gc);
    vm.trace_exec = cli.trace;

    match cli.paths.first() {
        Some(path) => run_file(&mut vm, path),
        None => run_repl(&mut vm),
    }
}

/// Reads `path` as raw bytes and interprets it once. No UTF-8 validation
/// happens here; the language treats source as 8-bit text.
fn run_file(vm: &mut Vm, path: &PathBuf) -> ExitCode {
    log::debug!("running {}", path.display());
    let source = match read_source(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_IO_ERROR);
        }
    };

    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(FaxError::Compile { messages }) => {
            report_compile_errors(&messages);
            ExitCode::from(EXIT_COMPILE_ERROR)
        }
        // The VM has already written the message and stack trace to its
        // stderr sink by the time `interpret` returns this.
        Err(FaxError::Runtime { .. }) => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}

fn read_source(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Could not read file \"{}\"", path.display()))
}

fn report_compile_errors(messages: &[String]) {
    for message in messages {
        eprintln!("{message}");
    }
}

/// `> ` prompt, one line at a time, same `Vm` across lines so later lines
/// see earlier ones' globals. EOF exits cleanly with 0; a runtime error is
/// reported (by the VM, to stderr) and the loop continues rather than
/// exiting, discarding just the failed line.
fn run_repl(vm: &mut Vm) -> ExitCode {
    log::debug!("starting REPL");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::SUCCESS;
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(_)) | None => return ExitCode::SUCCESS,
        };
        // A runtime error is already reported to the VM's stderr sink by
        // the time `interpret` returns; a compile error isn't, since the
        // compiler only collects messages (`fax_compiler::compile` has no
        // stderr of its own). Either way the VM is left ready for the
        // next line.
        if let Err(FaxError::Compile { messages }) = vm.interpret(line.as_bytes()) {
            report_compile_errors(&messages);
        }
    }
}
