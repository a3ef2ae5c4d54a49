use crate::config::BacktestSettings;
use crate::data_context::MarketData;
use crate::optimizer::{ParameterSweep, SweepResult};
use anyhow::{anyhow, Context, Result};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const TOP_RESULTS: usize = 10;

pub fn run(
    market_data_file: &Path,
    short_windows: &[usize],
    long_windows: &[usize],
    settings: BacktestSettings,
    output: Option<&Path>,
) -> Result<Vec<SweepResult>> {
    let data = MarketData::load_from_file(market_data_file)?;
    let grid = ParameterSweep::crossover_grid(short_windows, long_windows);
    if grid.is_empty() {
        return Err(anyhow!(
            "No valid (short, long) window pairs in {:?} x {:?}",
            short_windows,
            long_windows
        ));
    }

    let show_progress = settings.show_progress;
    let sweep = ParameterSweep::new(&data, settings, "ma_crossover");
    let results = sweep.run(&grid, show_progress);
    if results.is_empty() {
        return Err(anyhow!("Every parameter set failed; see warnings above"));
    }

    println!("{:<32} {:>12} {:>10} {:>8}", "parameters", "twr", "drawdown", "trades");
    for result in results.iter().take(TOP_RESULTS) {
        println!(
            "{:<32} {:>12} {:>10} {:>8}",
            result.signature,
            result.twr.round_dp(6),
            result.max_drawdown_ratio.round_dp(4),
            result.trade_count
        );
    }

    if let Some(path) = output {
        let file = File::create(path)
            .with_context(|| format!("Unable to create sweep report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &results)
            .context("Failed to serialize sweep results")?;
        info!("Wrote {} sweep result(s) to {}", results.len(), path.display());
    }
    Ok(results)
}
