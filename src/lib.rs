pub mod api;
pub mod config;
pub mod http;
pub mod orchestrator;

pub use use_delegation_sdk as sdk;

use orchestrator::{RunReport, StepOutcome, StepReport};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn print_header(title: &str) {
    println!("\n=== {} ===\n", title);
}

pub fn print_step(num: usize, description: &str) {
    println!("Step {}: {}", num, description);
}

pub fn print_step_report(report: &StepReport) {
    print_step(report.step.number(), report.step.description());
    match &report.outcome {
        StepOutcome::Confirmed { confirmations } => {
            for c in confirmations {
                println!("  [confirmed] txid {} (slot {})", c.signature, c.slot);
            }
        }
        StepOutcome::RejectedAsExpected { rejection } => {
            println!("  [rejected as expected] {}", rejection);
        }
    }
    println!("  {}", report.message);
}

pub fn print_run_report(report: &RunReport) {
    print_header("Delegated use run");
    println!("Owner:      {}", report.owner);
    println!("Delegate:   {}", report.delegate);
    println!("Capability: {}", report.capability);
    println!();
    for step in &report.steps {
        print_step_report(step);
    }
    let state = &report.final_state;
    print_header("Final capability state");
    println!("Owner:          {}", state.owner);
    println!(
        "Delegate:       {}",
        state
            .delegate()
            .map_or_else(|| "none".to_string(), |d| d.to_string())
    );
    println!(
        "Remaining uses: {} of {}",
        state.uses.remaining, state.uses.total
    );
    println!("Revoked:        {}", state.revoked);
    println!("Burned:         {}", state.burned);
}
