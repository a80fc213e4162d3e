use clap::Parser;
use fax_drv::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    fax_drv::run(Cli::parse())
}
