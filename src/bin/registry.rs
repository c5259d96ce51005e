//! REST service hosting the reference capability registry.
//!
//! Usage:
//!   cargo run --bin registry
//!   cargo run --bin registry -- --listen 127.0.0.1:9000 --slot-ms 100

use clap::Parser;
use std::time::Duration;
use use_delegation_lab::api::{AppState, build_router, start_slot_clock};
use use_delegation_lab::init_tracing;
use use_delegation_lab::sdk::{MemoryLedger, RegistryParams};

#[derive(Debug, Parser)]
#[command(name = "registry", version, about = "Capability registry service")]
struct Args {
    #[arg(long, env = "REGISTRY_LISTEN", default_value = "0.0.0.0:8899")]
    listen: String,

    /// Slot duration in milliseconds.
    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u64).range(1..))]
    slot_ms: u64,

    /// Flat fee per transaction.
    #[arg(long, default_value_t = RegistryParams::default().fee)]
    fee: u64,

    /// Largest single airdrop.
    #[arg(long, default_value_t = RegistryParams::default().airdrop_limit)]
    airdrop_limit: u64,

    /// Slots a transaction must age before it is confirmed.
    #[arg(long, default_value_t = RegistryParams::default().confirmation_depth)]
    confirmation_depth: u64,

    /// Slots an expired signature stays queryable before it is pruned.
    #[arg(long, default_value_t = RegistryParams::default().signature_retention)]
    signature_retention: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("registry=info,use_delegation_lab=info,use_delegation_sdk=info");
    let args = Args::parse();

    let params = RegistryParams {
        fee: args.fee,
        airdrop_limit: args.airdrop_limit,
        confirmation_depth: args.confirmation_depth,
        signature_retention: args.signature_retention,
    };
    let state = AppState {
        ledger: MemoryLedger::new(params).with_auto_advance(false),
    };
    start_slot_clock(state.clone(), Duration::from_millis(args.slot_ms));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "registry listening");
    println!("Listening on http://{}", args.listen);
    println!();
    println!("Endpoints:");
    println!("  GET  /health");
    println!("  POST /airdrop");
    println!("  POST /transactions");
    println!("  GET  /transactions/{{signature}}");
    println!("  GET  /accounts/{{address}}");
    println!("  GET  /capabilities/{{id}}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
