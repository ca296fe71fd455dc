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

//! Assets tradeable or holdable in the ledger: EUR, other fiat, and crypto tickers.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Tax-relevant classification of an [`Asset`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    FiatEur,
    FiatOther,
    Crypto,
}

/// A case-normalized ticker plus its classification. EUR is the reporting numéraire.
///
/// Unlike the closed asset enums this type descends from, the symbol set is open: any ticker
/// the normalizer encounters is accepted, classified `Crypto` unless it matches a known fiat code.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Asset {
    symbol: String,
    class: AssetClass,
}

const KNOWN_FIAT: &[&str] = &["USD", "GBP", "CHF", "JPY"];

impl Asset {
    /// Construct an asset from an already-normalized (uppercase, trimmed) symbol.
    fn from_symbol(symbol: String) -> Self {
        let class = if symbol == "EUR" {
            AssetClass::FiatEur
        } else if KNOWN_FIAT.contains(&symbol.as_str()) {
            AssetClass::FiatOther
        } else {
            AssetClass::Crypto
        };
        Asset { symbol, class }
    }

    /// The reporting numéraire.
    pub fn eur() -> Self {
        Asset::from_symbol("EUR".to_string())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    pub fn is_fiat(&self) -> bool {
        matches!(self.class, AssetClass::FiatEur | AssetClass::FiatOther)
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self.class, AssetClass::Crypto)
    }

    pub fn is_eur(&self) -> bool {
        matches!(self.class, AssetClass::FiatEur)
    }
}

impl FromStr for Asset {
    type Err = ();

    /// Normalizes case and trims whitespace; never fails — an empty symbol simply yields an
    /// empty, crypto-classified asset (callers reject empty-symbol legs separately).
    fn from_str(input: &str) -> Result<Asset, Self::Err> {
        Ok(Asset::from_symbol(input.trim().to_uppercase()))
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eur_is_fiat_and_numeraire() {
        let eur: Asset = "eur".parse().unwrap();
        assert!(eur.is_eur());
        assert!(eur.is_fiat());
        assert!(!eur.is_crypto());
    }

    #[test]
    fn unknown_ticker_classifies_as_crypto() {
        let btc: Asset = " btc ".parse().unwrap();
        assert_eq!(btc.symbol(), "BTC");
        assert!(btc.is_crypto());
    }

    #[test]
    fn known_fiat_classifies_distinct_from_eur() {
        let usd: Asset = "usd".parse().unwrap();
        assert!(usd.is_fiat());
        assert!(!usd.is_eur());
    }
}
