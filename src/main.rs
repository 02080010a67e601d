use clap::Parser;
use fundledger::cli::{self, Cli};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    match cli::run(Cli::parse().into()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("fundledger: {}", e);
            ExitCode::FAILURE
        }
    }
}
