use crate::backtester::Backtester;
use crate::config::BacktestSettings;
use crate::data_context::MarketData;
use crate::performance::BacktestStatistics;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Context, Result};
use log::info;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub fn run(
    template_id: &str,
    parameters: HashMap<String, f64>,
    market_data_file: &Path,
    settings: BacktestSettings,
    output: Option<&Path>,
) -> Result<BacktestStatistics> {
    info!(
        "Received backtest command for template_id={} using {}",
        template_id,
        market_data_file.display()
    );
    let data = MarketData::load_from_file(market_data_file)?;
    if !data.has_data() {
        return Err(anyhow!(
            "Market data snapshot {} contains no candles",
            market_data_file.display()
        ));
    }

    let mut strategy = create_strategy(template_id, parameters)?;
    let mut backtester = Backtester::from_market_data(&data, settings)?;
    let stats = backtester
        .run(strategy.as_mut())
        .with_context(|| format!("Backtest of {} on {} failed", template_id, data.ticker()))?;

    print_summary(template_id, data.ticker(), &stats);

    if let Some(path) = output {
        write_report(path, &stats)?;
        info!("Wrote backtest report to {}", path.display());
    }
    Ok(stats)
}

fn print_summary(template_id: &str, ticker: &str, stats: &BacktestStatistics) {
    println!("Strategy:        {}", template_id);
    println!("Ticker:          {}", ticker);
    println!("Commission rate: {}", stats.commission_rate);
    println!(
        "Trades:          {} ({} winning, {} losing)",
        stats.trades.len(),
        stats.winning_trades,
        stats.losing_trades
    );
    println!("TWR:             {}", stats.twr.round_dp(6));
    match stats.geometric_mean {
        Some(mean) => println!("Geometric mean:  {:.6}", mean),
        None => println!("Geometric mean:  n/a"),
    }
    println!("Max drawdown:    {}", stats.max_drawdown_ratio.round_dp(6));
    if let Some(summary) = &stats.summary {
        println!(
            "Profit ratios:   min {:.4} / q25 {:.4} / median {:.4} / q75 {:.4} / max {:.4}",
            summary.min, summary.q25, summary.median, summary.q75, summary.max
        );
    }
}

fn write_report(path: &Path, stats: &BacktestStatistics) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Unable to create report file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), stats)
        .context("Failed to serialize backtest report")?;
    Ok(())
}
