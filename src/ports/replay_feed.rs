use anyhow::{anyhow, Context, Result};
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// Mirrors one line of a JSONL price dump. Extra per-symbol fields such as
// funding or book sizes are ignored.
#[derive(Debug, Clone, Deserialize)]
struct DumpedSymbolSnapshot {
    price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct DumpedDataEntry {
    timestamp: i64,
    prices: HashMap<String, DumpedSymbolSnapshot>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: i64,
    price1: f64,
    price2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub price1: f64,
    pub price2: f64,
}

/// Aligned two-leg price history replayed tick by tick.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    ticks: Vec<PriceTick>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn from_ticks(ticks: Vec<PriceTick>) -> Result<Self> {
        if ticks.is_empty() {
            return Err(anyhow!("replay feed has no ticks"));
        }
        Ok(Self { ticks, cursor: 0 })
    }

    /// Loads a `.csv` file as `timestamp,price1,price2`, anything else as a
    /// JSONL dump keyed by the two symbols.
    pub fn from_path<P: AsRef<Path>>(path: P, symbol1: &str, symbol2: &str) -> Result<Self> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::from_csv(path)
        } else {
            Self::from_jsonl(path, symbol1, symbol2)
        }
    }

    pub fn from_jsonl<P: AsRef<Path>>(path: P, symbol1: &str, symbol2: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut ticks = Vec::new();
        let mut skipped = 0usize;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.context("failed to read replay line")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: DumpedDataEntry = serde_json::from_str(&line).with_context(|| {
                format!("failed to parse replay entry at line {}", lineno + 1)
            })?;
            let leg1 = entry.prices.get(symbol1).and_then(|s| s.price.to_f64());
            let leg2 = entry.prices.get(symbol2).and_then(|s| s.price.to_f64());
            match (leg1, leg2) {
                (Some(price1), Some(price2)) => ticks.push(PriceTick {
                    timestamp: entry.timestamp / 1000, // stored as ms
                    price1,
                    price2,
                }),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(
                "{} replay entries lacked {} or {}",
                skipped, symbol1, symbol2
            );
        }
        Self::from_ticks(ticks)
            .with_context(|| format!("no {}/{} pairs in {}", symbol1, symbol2, path.display()))
    }

    /// Reads `timestamp,price1,price2` rows. A leading header row and `#`
    /// comment lines are skipped.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut ticks = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.context("failed to read replay row")?;
            let line = record.position().map_or(index as u64 + 1, |p| p.line());
            if index == 0 && record.get(0).map_or(false, |f| f.parse::<i64>().is_err()) {
                // header row
                continue;
            }
            let row: CsvRow = record
                .deserialize(None)
                .with_context(|| format!("line {}: bad replay row", line))?;
            ticks.push(PriceTick {
                timestamp: row.timestamp,
                price1: row.price1,
                price2: row.price2,
            });
        }
        Self::from_ticks(ticks).with_context(|| format!("empty replay file {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn ticks(&self) -> &[PriceTick] {
        &self.ticks
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len() - self.cursor
    }

    /// Consumes up to `n` ticks as two aligned price series.
    pub fn take_history(&mut self, n: usize) -> (Vec<f64>, Vec<f64>) {
        let end = (self.cursor + n).min(self.ticks.len());
        let series = self.ticks[self.cursor..end]
            .iter()
            .map(|t| (t.price1, t.price2))
            .unzip();
        self.cursor = end;
        series
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for ReplayFeed {
    type Item = PriceTick;

    fn next(&mut self) -> Option<PriceTick> {
        let tick = self.ticks.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_jsonl_dump_for_two_symbols() {
        let file = write_temp(
            ".jsonl",
            concat!(
                r#"{"timestamp":1700000000000,"prices":{"BTC":{"price":"100.5","funding_rate":"0.0001","bid_size":"1","ask_size":"2"},"ETH":{"price":5.25}}}"#,
                "\n\n",
                r#"{"timestamp":1700000060000,"prices":{"BTC":{"price":101}}}"#,
                "\n",
                r#"{"timestamp":1700000120000,"prices":{"BTC":{"price":102},"ETH":{"price":5.5}}}"#,
                "\n"
            ),
        );
        let feed = ReplayFeed::from_path(file.path(), "BTC", "ETH").unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(
            feed.ticks()[0],
            PriceTick {
                timestamp: 1_700_000_000,
                price1: 100.5,
                price2: 5.25
            }
        );
        assert_eq!(feed.ticks()[1].timestamp, 1_700_000_120);
    }

    #[test]
    fn missing_symbol_everywhere_is_an_error() {
        let file = write_temp(
            ".jsonl",
            r#"{"timestamp":1,"prices":{"BTC":{"price":1}}}"#,
        );
        assert!(ReplayFeed::from_jsonl(file.path(), "BTC", "SOL").is_err());
    }

    #[test]
    fn loads_csv_with_header() {
        let file = write_temp(
            ".csv",
            "timestamp,price1,price2\n# comment\n10,24.0,16.0\n20, 24.5 ,16.5\n",
        );
        let mut feed = ReplayFeed::from_path(file.path(), "", "").unwrap();
        assert_eq!(feed.len(), 2);
        let (h1, h2) = feed.take_history(1);
        assert_eq!((h1, h2), (vec![24.0], vec![16.0]));
        assert_eq!(feed.remaining(), 1);
        assert_eq!(
            feed.next(),
            Some(PriceTick {
                timestamp: 20,
                price1: 24.5,
                price2: 16.5
            })
        );
        assert_eq!(feed.next(), None);
        feed.rewind();
        assert_eq!(feed.remaining(), 2);
    }

    #[test]
    fn quoted_csv_fields_are_accepted() {
        let file = write_temp(".csv", "\"timestamp\",\"price1\",\"price2\"\n10,\"24.0\",\"16.0\"\n");
        let feed = ReplayFeed::from_csv(file.path()).unwrap();
        assert_eq!(
            feed.ticks(),
            &[PriceTick {
                timestamp: 10,
                price1: 24.0,
                price2: 16.0
            }]
        );
    }

    #[test]
    fn short_csv_row_is_rejected() {
        let file = write_temp(".csv", "1,2.0,3.0\n2,3.0\n");
        assert!(ReplayFeed::from_csv(file.path()).is_err());
    }

    #[test]
    fn malformed_csv_row_is_reported() {
        let file = write_temp(".csv", "1,2.0,3.0\n2,abc,3.0\n");
        let err = ReplayFeed::from_csv(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
