use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fundme::{
    chain::Scenario,
    config::{ChainConfig, MOCK_FEED_DECIMALS},
    oracle::PriceConverter,
    Amount,
};

#[derive(Parser)]
#[command(name = "fundme", version, about = "Oracle-priced funding ledger toolkit")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a JSON scenario against a fresh local chain and print the report
    Simulate {
        scenario: PathBuf,
        /// Chain/funding config (JSON); defaults apply to missing fields
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Price a contribution against the minimum threshold
    Quote {
        /// Raw feed answer, e.g. 200000000000 for 2000.00000000
        #[arg(long)]
        answer: i128,
        #[arg(long, default_value_t = MOCK_FEED_DECIMALS)]
        decimals: u8,
        /// Native amount in smallest units
        #[arg(long)]
        amount: Option<Amount>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Quote {
    price: u128,
    decimals: u8,
    minimum_reference_value: Amount,
    minimum_native_amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_value: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted: Option<bool>,
}

fn load_config(path: Option<&PathBuf>) -> Result<ChainConfig> {
    match path {
        Some(path) => Ok(ChainConfig::load(path)?),
        None => Ok(ChainConfig::default()),
    }
}

fn simulate_cmd(scenario: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let bytes = fs::read(&scenario)
        .with_context(|| format!("read scenario {}", scenario.display()))?;
    let scenario = Scenario::from_json(&bytes).context("parse scenario")?;
    let report = scenario.run(config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn quote_cmd(
    answer: i128,
    decimals: u8,
    amount: Option<Amount>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_ref())?;
    if answer <= 0 {
        anyhow::bail!("feed answer must be positive, got {answer}");
    }
    let price = answer as u128;
    let converter = PriceConverter::new(&config.funding, decimals)?;
    let quote = Quote {
        price,
        decimals,
        minimum_reference_value: converter.minimum(),
        minimum_native_amount: converter.minimum_native_amount(price),
        amount,
        reference_value: amount.map(|a| converter.reference_value(a, price)),
        accepted: amount.map(|a| a > 0 && converter.meets_minimum(a, price)),
    };
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Simulate { scenario, config } => simulate_cmd(scenario, config),
        Command::Quote {
            answer,
            decimals,
            amount,
            config,
        } => quote_cmd(answer, decimals, amount, config),
    }
}
