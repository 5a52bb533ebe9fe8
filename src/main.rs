//! Quiver CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;

use quiver::cli::args::*;
use quiver::cli::commands::*;

fn main() {
    let args = QuiverArgs::parse();

    Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format(|buf, record| {
            writeln!(buf, "{:<5} {}: {}", record.level(), record.target(), record.args())
        })
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("quiver: {e}");
        process::exit(1);
    }
}
