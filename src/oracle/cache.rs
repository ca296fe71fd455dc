//! On-disk, append-only price cache: one shard file per `(asset, year-month)` (§6), written
//! atomically so a crash mid write never corrupts an already-committed price.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::QntropyError;

/// A cached price keyed by `(asset, day)`, content-addressed to one shard file per
/// `(asset, year-month)` so concurrent runs over disjoint assets or date ranges never
/// contend on the same file.
pub struct PriceCache {
    dir: PathBuf,
}

impl PriceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PriceCache { dir: dir.into() }
    }

    fn shard_path(&self, asset: &str, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}-{:04}-{:02}.csv", asset.to_uppercase(), day.year(), day.month()))
    }

    /// Read every cached entry for `asset`'s shard covering `day`'s month, keyed by calendar day.
    /// Returns an empty map if the shard does not exist yet.
    fn read_shard(&self, asset: &str, day: NaiveDate) -> Result<HashMap<NaiveDate, (Decimal, String)>, QntropyError> {
        let path = self.shard_path(asset, day);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| QntropyError::CacheIoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut out = HashMap::new();
        for line in content.lines() {
            let mut fields = line.splitn(4, ',');
            let (Some(date_str), Some(_asset), Some(price_str), Some(source)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            let Ok(line_day) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            let Ok(price) = Decimal::from_str(price_str) else {
                continue;
            };
            // First line for a day wins; later duplicate lines from concurrent appends lose.
            out.entry(line_day).or_insert((price, source.to_string()));
        }
        Ok(out)
    }

    pub fn lookup(&self, asset: &str, day: NaiveDate) -> Result<Option<(Decimal, String)>, QntropyError> {
        Ok(self.read_shard(asset, day)?.get(&day).cloned())
    }

    /// Append a new price to the asset's month shard. Writes to a temp file and renames into
    /// place so a reader never observes a partially written shard.
    pub fn store(
        &self,
        asset: &str,
        day: NaiveDate,
        price: Decimal,
        source_tag: &str,
    ) -> Result<(), QntropyError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| QntropyError::CacheIoError {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let path = self.shard_path(asset, day);
        let mut existing = if path.exists() {
            std::fs::read_to_string(&path).map_err(|e| QntropyError::CacheIoError {
                path: path.display().to_string(),
                source: e,
            })?
        } else {
            String::new()
        };
        if !existing.is_empty() && !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(&format!("{day},{},{price},{source_tag}\n", asset.to_uppercase()));

        write_atomic(&path, existing.as_bytes())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), QntropyError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|e| QntropyError::CacheIoError {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        tmp.write_all(content)
            .map_err(|e| QntropyError::CacheIoError {
                path: tmp_path.display().to_string(),
                source: e,
            })?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| QntropyError::CacheIoError {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("qntropy-cache-test-{tag}-{:?}", std::thread::current().id()))
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let dir = scratch_dir("round-trip");
        let cache = PriceCache::new(&dir);
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        cache.store("BTC", day, dec!(27000.5), "static-fixture").unwrap();

        let (price, tag) = cache.lookup("btc", day).unwrap().unwrap();
        assert_eq!(price, dec!(27000.5));
        assert_eq!(tag, "static-fixture");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_shard_is_empty_not_error() {
        let dir = scratch_dir("missing");
        let cache = PriceCache::new(&dir);
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert!(cache.lookup("BTC", day).unwrap().is_none());
    }

    #[test]
    fn first_entry_wins_on_duplicate_append() {
        let dir = scratch_dir("dup");
        let cache = PriceCache::new(&dir);
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        cache.store("BTC", day, dec!(100), "a").unwrap();
        cache.store("BTC", day, dec!(200), "b").unwrap();

        let (price, _) = cache.lookup("BTC", day).unwrap().unwrap();
        assert_eq!(price, dec!(100));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn distinct_assets_use_distinct_shards_same_month() {
        let dir = scratch_dir("distinct");
        let cache = PriceCache::new(&dir);
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        cache.store("BTC", day, dec!(27000), "a").unwrap();
        cache.store("ETH", day, dec!(1800), "a").unwrap();

        assert_eq!(cache.lookup("BTC", day).unwrap().unwrap().0, dec!(27000));
        assert_eq!(cache.lookup("ETH", day).unwrap().unwrap().0, dec!(1800));

        std::fs::remove_dir_all(&dir).ok();
    }
}
