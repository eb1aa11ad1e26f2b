mod cli;

use crate::cli::CLI;
use clap::Parser;

fn main() {
    let CLI { command } = CLI::parse();
    let json = command.json_output();

    match command.run() {
        Ok(report) if report.validation_passed => {}
        Ok(_) => std::process::exit(1),
        Err(error) => {
            cli::emit_error(json, &error);
            std::process::exit(1);
        }
    }
}
