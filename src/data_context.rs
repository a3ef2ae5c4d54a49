use crate::error::{BacktestError, BacktestResult};
use crate::models::{Candle, Instrument, Interval};
use anyhow::{anyhow, Context, Result};
use chrono::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;
const UNKNOWN_TICKER: &str = "UNKNOWN";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Binary,
    Json,
}

impl SnapshotFormat {
    /// `.json` files are JSON, everything else is the binary snapshot format.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Binary,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MarketDataSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    #[serde(default)]
    instrument: Option<Instrument>,
    #[serde(default)]
    interval: Option<Interval>,
    candles: Vec<Candle>,
}

/// Ordered candle feed for a single instrument.
#[derive(Debug, Clone)]
pub struct MarketData {
    instrument: Option<Instrument>,
    interval: Option<Interval>,
    candles: Vec<Candle>,
}

impl MarketData {
    pub fn new(
        instrument: Option<Instrument>,
        interval: Option<Interval>,
        candles: Vec<Candle>,
    ) -> BacktestResult<Self> {
        validate_feed(&candles)?;
        Ok(Self {
            instrument,
            interval,
            candles,
        })
    }

    pub fn from_candles(candles: Vec<Candle>) -> BacktestResult<Self> {
        Self::new(None, None, candles)
    }

    pub fn has_data(&self) -> bool {
        !self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }

    pub fn interval(&self) -> Option<Interval> {
        self.interval
    }

    pub fn ticker(&self) -> &str {
        self.instrument
            .as_ref()
            .map(|instrument| instrument.ticker.as_str())
            .unwrap_or(UNKNOWN_TICKER)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!("Failed to open market data snapshot at {}", path.display())
        })?;
        let reader = BufReader::new(file);
        let snapshot: MarketDataSnapshot = match SnapshotFormat::from_path(path) {
            SnapshotFormat::Json => {
                serde_json::from_reader(reader).context("Snapshot JSON decode failed")?
            }
            SnapshotFormat::Binary => {
                bincode::deserialize_from(reader).context("Snapshot decode failed")?
            }
        };

        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Market data snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                MARKET_DATA_SNAPSHOT_VERSION
            ));
        }

        let data = Self::new(snapshot.instrument, snapshot.interval, snapshot.candles)
            .with_context(|| format!("Invalid candle feed in {}", path.display()))?;
        info!(
            "Loaded {} candle(s) for {} from {}",
            data.candles.len(),
            data.ticker(),
            path.display()
        );
        Ok(data)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path).with_context(|| {
            format!(
                "Unable to create market data snapshot at {}",
                path.display()
            )
        })?;
        let mut writer = BufWriter::new(file);
        let snapshot = MarketDataSnapshot {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            instrument: self.instrument.clone(),
            interval: self.interval,
            candles: self.candles.clone(),
        };
        match SnapshotFormat::from_path(path) {
            SnapshotFormat::Json => serde_json::to_writer_pretty(&mut writer, &snapshot)
                .context("Failed to serialize market data snapshot as JSON")?,
            SnapshotFormat::Binary => bincode::serialize_into(&mut writer, &snapshot)
                .context("Failed to serialize market data snapshot")?,
        }
        writer
            .flush()
            .context("Failed to flush market data snapshot to disk")?;
        Ok(())
    }
}

/// Candle times must be strictly increasing.
pub fn validate_feed(candles: &[Candle]) -> BacktestResult<()> {
    for pair in candles.windows(2) {
        if pair[1].time <= pair[0].time {
            return Err(BacktestError::UnorderedFeed {
                previous: pair[0].time,
                current: pair[1].time,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn candles(count: i64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2020, 3, 2, 7, 0, 0).unwrap();
        (0..count)
            .map(|i| Candle {
                open: dec!(100.10) + rust_decimal::Decimal::from(i),
                high: dec!(101.25) + rust_decimal::Decimal::from(i),
                low: dec!(99.05) + rust_decimal::Decimal::from(i),
                close: dec!(100.75) + rust_decimal::Decimal::from(i),
                volume: dec!(1520),
                time: base + Duration::hours(i),
            })
            .collect()
    }

    fn instrument() -> Instrument {
        Instrument {
            name: "Apple".to_string(),
            ticker: "AAPL".to_string(),
            figi: "BBG000B9XRY4".to_string(),
            currency: Currency::Usd,
        }
    }

    #[test]
    fn rejects_duplicate_or_backwards_times() {
        let mut feed = candles(3);
        feed[2].time = feed[1].time;
        let err = MarketData::from_candles(feed).unwrap_err();
        assert!(matches!(err, BacktestError::UnorderedFeed { .. }));
    }

    #[test]
    fn binary_snapshot_round_trips_exact_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("aapl.bin");
        let data = MarketData::new(Some(instrument()), Some(Interval::Hour1), candles(5)).unwrap();

        data.save_to_file(&path).unwrap();
        let loaded = MarketData::load_from_file(&path).unwrap();

        assert_eq!(loaded.ticker(), "AAPL");
        assert_eq!(loaded.interval(), Some(Interval::Hour1));
        assert_eq!(loaded.candles(), data.candles());
    }

    #[test]
    fn json_snapshot_keeps_prices_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        MarketData::from_candles(candles(2))
            .unwrap()
            .save_to_file(&path)
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"open\": \"100.10\""));

        let loaded = MarketData::load_from_file(&path).unwrap();
        assert_eq!(loaded.ticker(), UNKNOWN_TICKER);
        assert_eq!(loaded.candles().len(), 2);
    }

    #[test]
    fn version_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(
            &path,
            r#"{"version": 99, "generated_at": "2020-01-01T00:00:00Z", "candles": []}"#,
        )
        .unwrap();

        let err = MarketData::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }
}
