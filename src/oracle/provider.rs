// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Price providers: pluggable sources of an asset's EUR price on a given day.
//!
//! Grounded on the teacher's `PriceProvider` trait / `BasicPriceProvider` (`price_provider.rs`),
//! generalized from a single in-memory table to an ordered registry so more sources can be
//! layered later without touching the oracle itself.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::QntropyError;

/// A source of day-resolution prices, quoted in some fixed unit (not necessarily EUR — the
/// oracle bridges via [`crate::config::Config::bridge_assets`] when needed).
pub trait PriceSource {
    /// A short tag recorded alongside cached prices, identifying where they came from.
    fn tag(&self) -> &'static str;

    /// Attempt to quote `asset` on `day`. `None` means "this source has nothing for that pair",
    /// not an error — the oracle moves on to the next source in the registry.
    fn try_quote(&self, asset: &str, day: NaiveDate) -> Option<Decimal>;
}

/// A static, offline price table loaded once from a TOML fixture (§4.2 Non-goals: no live
/// network provider ships). Mirrors the teacher's `BasicPriceProvider`.
pub struct StaticTableProvider {
    prices: HashMap<(String, NaiveDate), Decimal>,
}

impl StaticTableProvider {
    pub fn load(path: &std::path::Path) -> Result<Self, QntropyError> {
        let content = std::fs::read_to_string(path)?;
        let table: PriceTable = toml::from_str(&content)
            .map_err(|e| QntropyError::Config(format!("{}: {e}", path.display())))?;

        let mut prices = HashMap::new();
        for entry in table.price {
            let day = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").map_err(|e| {
                QntropyError::Config(format!("bad date '{}' in price fixture: {e}", entry.date))
            })?;
            let key = (entry.asset.to_uppercase(), day);
            if prices.contains_key(&key) {
                log::warn!(
                    "duplicate price fixture entry for {} on {}, keeping the first",
                    entry.asset,
                    day
                );
                continue;
            }
            prices.insert(key, entry.price);
        }
        Ok(StaticTableProvider { prices })
    }

    pub fn empty() -> Self {
        StaticTableProvider {
            prices: HashMap::new(),
        }
    }
}

impl PriceSource for StaticTableProvider {
    fn tag(&self) -> &'static str {
        "static-fixture"
    }

    fn try_quote(&self, asset: &str, day: NaiveDate) -> Option<Decimal> {
        self.prices.get(&(asset.to_uppercase(), day)).copied()
    }
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    asset: String,
    price: Decimal,
    date: String,
}

#[derive(Debug, Deserialize)]
struct PriceTable {
    price: Vec<PriceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn write_fixture(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "qntropy-price-fixture-{:?}.toml",
            std::thread::current().id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_and_quotes_known_entry() {
        let path = write_fixture(
            r#"
            [[price]]
            asset = "BTC"
            price = "27000.50"
            date = "2023-06-01"
            "#,
        );
        let provider = StaticTableProvider::load(&path).unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(provider.try_quote("btc", day), Some(dec!(27000.50)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_entry_is_none_not_error() {
        let provider = StaticTableProvider::empty();
        let day = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(provider.try_quote("ETH", day), None);
    }
}
