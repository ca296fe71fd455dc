//! Component B — the price oracle: EUR-denominated daily prices, cached on disk, sourced from an
//! ordered registry of [`PriceSource`]s, with cross-rate bridging and a bounded fallback window.

pub mod cache;
pub mod provider;

use chrono::NaiveDate;
use qntropy_core::{AuditEntry, AuditKind, Instant};
use rust_decimal::Decimal;

pub use cache::PriceCache;
pub use provider::{PriceSource, StaticTableProvider};

use crate::error::QntropyError;

const FALLBACK_WINDOW_DAYS: i64 = 7;

/// Looks up EUR prices for assets on the day of a given instant, bridging through a configured
/// intermediate asset when a source only quotes the asset against something other than EUR, and
/// falling back up to [`FALLBACK_WINDOW_DAYS`] days earlier when the exact day is unavailable.
pub struct PriceOracle {
    sources: Vec<Box<dyn PriceSource>>,
    cache: PriceCache,
    bridge_assets: Vec<String>,
}

impl PriceOracle {
    pub fn new(cache: PriceCache, bridge_assets: Vec<String>) -> Self {
        PriceOracle {
            sources: Vec::new(),
            cache,
            bridge_assets,
        }
    }

    /// Sources are tried in registration order; the first to answer wins.
    pub fn register(&mut self, source: Box<dyn PriceSource>) {
        self.sources.push(source);
    }

    /// EUR itself is always worth 1 EUR and never touches a source or the cache.
    pub fn price_eur(
        &self,
        asset: &str,
        instant: Instant,
        audit: &mut Vec<AuditEntry>,
    ) -> Result<Decimal, QntropyError> {
        if asset.eq_ignore_ascii_case("EUR") {
            return Ok(Decimal::ONE);
        }

        let target_day = instant.date_naive();
        if let Some(price) = self.resolve_day(asset, target_day) {
            return Ok(price);
        }

        for offset in 1..=FALLBACK_WINDOW_DAYS {
            let day = target_day - chrono::Duration::days(offset);
            if let Some(price) = self.resolve_day(asset, day) {
                audit.push(AuditEntry::new(
                    instant,
                    AuditKind::PriceFallback,
                    asset.to_string(),
                    format!("no price for {target_day}, used {day} ({offset} day(s) earlier)"),
                ));
                return Ok(price);
            }
        }

        Err(QntropyError::MissingPrice {
            asset: asset.to_string(),
            instant: instant.to_rfc3339(),
        })
    }

    /// A cache I/O failure is retried once; a second failure is treated like a cache miss rather
    /// than a fatal error (§7), so a flaky disk falls through to the source registry instead of
    /// aborting the whole run.
    fn lookup_retrying(&self, asset: &str, day: NaiveDate) -> Option<(Decimal, String)> {
        match self.cache.lookup(asset, day) {
            Ok(hit) => hit,
            Err(_) => match self.cache.lookup(asset, day) {
                Ok(hit) => hit,
                Err(err) => {
                    log::warn!("price cache lookup failed twice for {asset} on {day}, treating as a miss: {err}");
                    None
                }
            },
        }
    }

    /// Symmetric to [`PriceOracle::lookup_retrying`]: a store failure (even after retry) is
    /// logged, not fatal, since the resolved price itself is still good to return uncached.
    fn store_retrying(&self, asset: &str, day: NaiveDate, price: Decimal, tag: &str) {
        if self.cache.store(asset, day, price, tag).is_err() {
            if let Err(err) = self.cache.store(asset, day, price, tag) {
                log::warn!("price cache store failed twice for {asset} on {day}, continuing uncached: {err}");
            }
        }
    }

    /// Resolve a single day, checking the cache first, then each source in order, bridging via
    /// [`PriceOracle::bridge_assets`] if a source only quotes against a non-EUR asset.
    fn resolve_day(&self, asset: &str, day: NaiveDate) -> Option<Decimal> {
        if let Some((price, _)) = self.lookup_retrying(asset, day) {
            return Some(price);
        }

        for source in &self.sources {
            if let Some(price) = source.try_quote(asset, day) {
                self.store_retrying(asset, day, price, source.tag());
                return Some(price);
            }
        }

        // Direct quote failed; try bridging through each configured intermediate asset, e.g.
        // ASSET/USD * USD/EUR when no source quotes ASSET/EUR directly.
        for bridge in &self.bridge_assets {
            let asset_in_bridge = self.quote_via_sources(asset, bridge, day);
            let bridge_in_eur = self.quote_via_sources(bridge, "EUR", day);
            if let (Some(a), Some(b)) = (asset_in_bridge, bridge_in_eur) {
                let price = a * b;
                self.store_retrying(asset, day, price, "bridged");
                return Some(price);
            }
        }

        None
    }

    fn quote_via_sources(&self, asset: &str, quote_in: &str, day: NaiveDate) -> Option<Decimal> {
        if quote_in.eq_ignore_ascii_case("EUR") {
            return self.sources.iter().find_map(|s| s.try_quote(asset, day));
        }
        // Only direct `asset/quote_in` pairs are attempted; genuine multi-hop bridging beyond
        // one intermediate asset is out of scope.
        self.sources
            .iter()
            .find_map(|s| s.try_quote(&format!("{asset}{quote_in}"), day))
    }

    pub fn is_within_tax_year(instant: Instant, tax_year: i32) -> bool {
        qntropy_core::tax_year_of(instant) == tax_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct FixedSource(&'static str, Decimal);
    impl PriceSource for FixedSource {
        fn tag(&self) -> &'static str {
            "fixed-test-source"
        }
        fn try_quote(&self, asset: &str, _day: NaiveDate) -> Option<Decimal> {
            if asset.eq_ignore_ascii_case(self.0) {
                Some(self.1)
            } else {
                None
            }
        }
    }

    fn scratch_cache(tag: &str) -> PriceCache {
        let dir = std::env::temp_dir().join(format!(
            "qntropy-oracle-test-{tag}-{:?}",
            std::thread::current().id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        PriceCache::new(dir)
    }

    #[test]
    fn eur_is_always_one() {
        let oracle = PriceOracle::new(scratch_cache("eur"), vec![]);
        let instant = chrono::Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let mut audit = Vec::new();
        assert_eq!(
            oracle.price_eur("EUR", instant, &mut audit).unwrap(),
            Decimal::ONE
        );
    }

    #[test]
    fn direct_source_quote_is_cached() {
        let mut oracle = PriceOracle::new(scratch_cache("direct"), vec![]);
        oracle.register(Box::new(FixedSource("BTC", dec!(27000))));
        let instant = chrono::Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let mut audit = Vec::new();
        assert_eq!(
            oracle.price_eur("BTC", instant, &mut audit).unwrap(),
            dec!(27000)
        );
        assert!(audit.is_empty());
    }

    #[test]
    fn falls_back_within_window_and_logs_audit() {
        struct OnlyOldDay;
        impl PriceSource for OnlyOldDay {
            fn tag(&self) -> &'static str {
                "only-old-day"
            }
            fn try_quote(&self, asset: &str, day: NaiveDate) -> Option<Decimal> {
                if asset.eq_ignore_ascii_case("BTC") && day == NaiveDate::from_ymd_opt(2023, 6, 1).unwrap() {
                    Some(dec!(27000))
                } else {
                    None
                }
            }
        }
        let mut oracle = PriceOracle::new(scratch_cache("fallback"), vec![]);
        oracle.register(Box::new(OnlyOldDay));
        let instant = chrono::Utc.with_ymd_and_hms(2023, 6, 3, 0, 0, 0).unwrap();
        let mut audit = Vec::new();
        let price = oracle.price_eur("BTC", instant, &mut audit).unwrap();
        assert_eq!(price, dec!(27000));
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].kind, AuditKind::PriceFallback);
    }

    #[test]
    fn beyond_window_is_missing_price_error() {
        let oracle = PriceOracle::new(scratch_cache("missing"), vec![]);
        let instant = chrono::Utc.with_ymd_and_hms(2023, 6, 10, 0, 0, 0).unwrap();
        let mut audit = Vec::new();
        let err = oracle.price_eur("ZZZ", instant, &mut audit).unwrap_err();
        assert!(matches!(err, QntropyError::MissingPrice { .. }));
    }
}
