//! fastsynth - render partials stored in an SDIF or SPC file, optionally
//! with dilation and constant frequency, amplitude, and bandwidth scaling.

mod cli_args;
mod render;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use cli_args::Cli;

fn main() -> ExitCode {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = err.print();
            return code;
        }
    };

    match render::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fastsynth: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
