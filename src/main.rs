//! Delegated use demonstration.
//!
//! Funds an owner and a delegate, creates a usable capability, delegates and
//! exercises it, revokes the delegation and shows the next use is refused.
//!
//! ```bash
//! cargo run                                    # in-process registry
//! cargo run --bin registry &                   # or a registry service...
//! cargo run -- --rpc-url http://127.0.0.1:8899 # ...and run against it
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use use_delegation_lab::config::DemoOptions;
use use_delegation_lab::http::HttpLedger;
use use_delegation_lab::orchestrator::Orchestrator;
use use_delegation_lab::sdk::{
    CapabilityClient, Ledger, MemoryLedger, Principal, RegistryParams, UseMethod,
};
use use_delegation_lab::{init_tracing, print_run_report};

#[derive(Debug, Parser)]
#[command(name = "use-delegation-lab", version, about)]
struct Cli {
    /// Registry service URL. Without it the run uses an in-process registry.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// TOML file with run options.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    funding_amount: Option<u64>,

    #[arg(long)]
    delegate_amount: Option<u64>,

    #[arg(long)]
    initial_uses: Option<u64>,

    #[arg(long, value_parser = parse_use_method)]
    use_method: Option<UseMethod>,

    #[arg(long)]
    max_supply: Option<u64>,

    #[arg(long)]
    delegated_uses: Option<u64>,

    /// Hex secret key for the owner; generated when absent.
    #[arg(long, env = "OWNER_SECRET", hide_env_values = true)]
    owner_secret: Option<String>,

    /// Hex secret key for the delegate; generated when absent.
    #[arg(long, env = "DELEGATE_SECRET", hide_env_values = true)]
    delegate_secret: Option<String>,

    /// Print the run report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn parse_use_method(s: &str) -> Result<UseMethod, String> {
    match s {
        "burn" => Ok(UseMethod::Burn),
        "multiple" => Ok(UseMethod::Multiple),
        "single" => Ok(UseMethod::Single),
        other => Err(format!("unknown use method: {other}")),
    }
}

impl Cli {
    fn options(&self) -> anyhow::Result<DemoOptions> {
        let mut options = match &self.config {
            Some(path) => DemoOptions::load(path)?,
            None => DemoOptions::default(),
        };
        if let Some(v) = self.funding_amount {
            options.funding_amount = v;
        }
        if let Some(v) = self.delegate_amount {
            options.delegate_amount = v;
        }
        if let Some(v) = self.initial_uses {
            options.initial_uses = v;
        }
        if let Some(v) = self.use_method {
            options.use_method = v;
        }
        if let Some(v) = self.max_supply {
            options.max_supply = v;
        }
        if let Some(v) = self.delegated_uses {
            options.delegated_uses = v;
        }
        Ok(options)
    }
}

fn load_principal(secret: Option<&str>) -> anyhow::Result<Principal> {
    match secret {
        Some(hex) => Ok(Principal::from_secret_hex(hex)?),
        None => Ok(Principal::generate()),
    }
}

async fn run<L: Ledger>(cli: &Cli, ledger: L) -> anyhow::Result<()> {
    let options = cli.options()?;
    let client = CapabilityClient::new(ledger).with_confirm_options(options.confirm_options());
    let owner = load_principal(cli.owner_secret.as_deref()).context("owner secret")?;
    let delegate = load_principal(cli.delegate_secret.as_deref()).context("delegate secret")?;
    println!(
        "Testing with owner ({}) and delegate ({})",
        owner.id(),
        delegate.id()
    );

    let orchestrator = Orchestrator::new(client, options, owner, delegate)?;
    let report = orchestrator.run().await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("use_delegation_lab=info,use_delegation_sdk=info");
    let cli = Cli::parse();

    match &cli.rpc_url {
        Some(url) => {
            let ledger = HttpLedger::new(url)?;
            let slot = ledger.health().await.with_context(|| {
                format!("failed to reach registry at {url}; is `cargo run --bin registry` running?")
            })?;
            println!("Connected to {} (slot {})", ledger.base_url(), slot);
            run(&cli, ledger).await
        }
        None => {
            println!("No --rpc-url given, using an in-process registry");
            run(&cli, MemoryLedger::new(RegistryParams::default())).await
        }
    }
}
