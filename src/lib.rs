pub mod address;
pub mod block;
pub mod config;
pub mod disk;
pub mod error;
pub mod message;
pub mod operation;
pub mod policy;
pub mod pool;
pub mod script;
pub mod simulator;
pub mod stats;
pub mod table;
pub mod tlb;

use config::Config;
use error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use message::BackendMessage;
use policy::build_policy;
use script::{Command, OperationReader};
use simulator::{MemorySimulator, Outcome, Report};
use std::io::{BufRead, Cursor};

/// Bytes per megabyte; every size the simulator accepts is expressed in MB.
pub const MB: u64 = 1024 * 1024;

/// Replay a script against a freshly built simulator and print what each command did.
///
/// Commands come from `config.script` when set and from stdin otherwise. A failing operation is
/// reported and the replay moves on; only configuration, I/O and script syntax errors end it.
pub fn run_simulation(config: Config) -> Result<()> {
    let mut simulator =
        MemorySimulator::build(config.geometry(), build_policy(config.eviction, config.seed))?;

    match &config.script {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            let bar = ProgressBar::new(contents.lines().count() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} lines")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            replay(
                &mut simulator,
                OperationReader::new(Cursor::new(contents)),
                &bar,
                config.json,
            )?;
            bar.finish_and_clear();
        }
        None => {
            let stdin = std::io::stdin();
            replay(
                &mut simulator,
                OperationReader::new(stdin.lock()),
                &ProgressBar::hidden(),
                config.json,
            )?;
        }
    }

    println!("{}", simulator.stats());
    Ok(())
}

fn replay<R: BufRead>(
    simulator: &mut MemorySimulator,
    mut reader: OperationReader<R>,
    bar: &ProgressBar,
    json: bool,
) -> Result<()> {
    while let Some(command) = reader.next() {
        bar.set_position(reader.line_number);
        match command? {
            Command::Operation(operation) => {
                let line = operation.to_string();
                let result = simulator.perform(operation);
                print_result(bar, &line, &result);
                if json {
                    match &result {
                        Ok(_) => print_messages(simulator, bar)?,
                        Err(err) => bar.println(BackendMessage::Error(err.to_string()).to_json()?),
                    }
                }
            }
            Command::Advance(ms) => print_outcomes(bar, simulator.advance(ms)),
            Command::Drain => print_outcomes(bar, simulator.drain()),
            Command::Stats => bar.println(simulator.stats().to_string()),
        }
    }
    Ok(())
}

fn print_result(bar: &ProgressBar, operation: &str, result: &Result<Report>) {
    match result {
        Ok(report) => {
            bar.println(format!("{} -> {}", operation, report));
            if let Some(translation) = &report.translation {
                bar.println(format!("    {}", translation.address));
            }
        }
        Err(err) => {
            error!("{} failed: {}", operation, err);
            bar.println(format!("{} -> [Error] {}", operation, err));
        }
    }
}

fn print_outcomes(bar: &ProgressBar, outcomes: Vec<Outcome>) {
    if outcomes.is_empty() {
        bar.println("(no deferred work due)");
    }
    for outcome in outcomes {
        print_result(bar, &format!("deferred {}", outcome.operation), &outcome.result);
    }
}

fn print_messages(simulator: &MemorySimulator, bar: &ProgressBar) -> Result<()> {
    for message in simulator.messages() {
        bar.println(message.to_json()?);
    }
    Ok(())
}
