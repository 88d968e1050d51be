//! Integration tests for the soilnet firmware core.
//!
//! Wires a simulated node against a simulated gateway and drives the
//! protocol end to end, from pairing through telemetry delivery.

mod sim;
mod tests;
mod world;

use clap::Parser;
use colored::Colorize;

use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Simulation tests for the soilnet firmware core")]
struct Args {
    /// Only run tests whose name contains this substring
    #[arg(short, long)]
    filter: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("{}", "Soilnet Integration Tests".bold());
    println!();
    println!("Running tests...\n");

    let results = run_all_tests(args.filter.as_deref());
    print_results(&results);

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
