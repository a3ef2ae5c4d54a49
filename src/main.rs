use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use tradesim::{
    commands::{backtest, sweep},
    config::BacktestSettings,
    strategy,
};

const DEFAULT_MARKET_DATA_FILE: &str = "data/market-data.bin";

#[derive(Parser)]
#[command(name = "tradesim")]
#[command(about = "Candle-by-candle strategy backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a market data snapshot through one strategy
    Backtest {
        /// Strategy template to run
        #[arg(long, default_value = "ordered_sma")]
        strategy: String,
        /// Path to the market data snapshot file (.bin or .json)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Strategy parameters as name=value, e.g. shortWindow=3
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
        /// Commission rate charged on each leg (overrides BACKTEST_COMMISSION_RATE)
        #[arg(long)]
        commission: Option<Decimal>,
        /// Write the full statistics report as JSON
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Grid-search ma_crossover windows and rank by TWR
    Sweep {
        /// Path to the market data snapshot file (.bin or .json)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Comma separated short windows
        #[arg(long, value_delimiter = ',', default_values_t = vec![2, 3, 5, 8])]
        short: Vec<usize>,
        /// Comma separated long windows
        #[arg(long, value_delimiter = ',', default_values_t = vec![10, 15, 20, 30])]
        long: Vec<usize>,
        /// Commission rate charged on each leg (overrides BACKTEST_COMMISSION_RATE)
        #[arg(long)]
        commission: Option<Decimal>,
        /// Write all ranked results as JSON
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let Cli { command } = Cli::parse();

    let env_settings = BacktestSettings::from_env()?;
    info!("Starting tradesim. Simulated results only, not financial advice.");

    match command {
        Commands::Backtest {
            strategy: template_id,
            data_file,
            params,
            commission,
            output,
            no_progress,
        } => {
            if !strategy::TEMPLATE_IDS.contains(&template_id.as_str()) {
                return Err(anyhow!(
                    "Unknown strategy {} (expected one of {})",
                    template_id,
                    strategy::TEMPLATE_IDS.join(", ")
                ));
            }
            let settings = apply_overrides(env_settings, commission, no_progress);
            let parameters = parse_params(&params)?;
            backtest::run(
                &template_id,
                parameters,
                &resolve_market_data_path(data_file),
                settings,
                output.as_deref(),
            )?;
        }
        Commands::Sweep {
            data_file,
            short,
            long,
            commission,
            output,
            no_progress,
        } => {
            let settings = apply_overrides(env_settings, commission, no_progress);
            sweep::run(
                &resolve_market_data_path(data_file),
                &short,
                &long,
                settings,
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}

fn apply_overrides(
    mut settings: BacktestSettings,
    commission: Option<Decimal>,
    no_progress: bool,
) -> BacktestSettings {
    if let Some(rate) = commission {
        settings.commission_rate = rate;
    }
    if no_progress {
        settings.show_progress = false;
    }
    settings
}

fn parse_params(raw: &[String]) -> Result<HashMap<String, f64>> {
    let mut parameters = HashMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Parameter {} must look like name=value", entry))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| anyhow!("Parameter {} must be numeric (value: {})", name, value))?;
        parameters.insert(name.trim().to_string(), value);
    }
    Ok(parameters)
}

fn resolve_market_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    cli_value.unwrap_or_else(|| PathBuf::from(DEFAULT_MARKET_DATA_FILE))
}
