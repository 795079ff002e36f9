//! Ord HTTP API client
//!
//! Thin typed wrapper around the JSON endpoints the capture pipeline reads:
//! current indexed height, the paginated rune listing, the full balances
//! map, and single-rune lookup by display name.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct OrdApiConfig {
    /// Base URL (e.g., "http://127.0.0.1:8080")
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl OrdApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Mint terms as ord serializes them: height and offset bounds ride as
/// two-element tuples.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TermsDetail {
    pub amount: Option<u128>,
    pub cap: Option<u128>,
    pub height: (Option<u64>, Option<u64>),
    pub offset: (Option<u64>, Option<u64>),
}

/// One rune's entry as served by ord. `spaced_rune` is the display form the
/// capture pipeline decodes and discards. `id` is only present on
/// single-rune lookups; the listing carries it as the page key instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuneDetail {
    #[serde(default)]
    pub id: Option<String>,
    pub number: u64,
    pub mints: u128,
    pub burned: u128,
    pub divisibility: u8,
    pub premine: u128,
    pub spaced_rune: String,
    pub symbol: Option<char>,
    pub turbo: bool,
    pub terms: Option<TermsDetail>,
}

/// One page of the rune listing. Entries are `("block:tx", detail)` pairs;
/// consecutive pages overlap by one boundary entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RunesPage {
    pub more: bool,
    pub entries: Vec<(String, RuneDetail)>,
}

/// Display name → ("txhash:index" → amount).
pub type BalancesMap = HashMap<String, HashMap<String, u128>>;

/// Ord HTTP API client
#[derive(Debug, Clone)]
pub struct OrdClient {
    client: Client,
    config: OrdApiConfig,
}

impl OrdClient {
    /// Create a new client. Fails only if the TLS backend cannot be
    /// initialized.
    pub fn new(config: OrdApiConfig) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> reqwest::Result<T> {
        self.client
            .get(format!("{}{}", self.config.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Current indexed block height.
    pub async fn block_height(&self) -> reqwest::Result<u64> {
        self.get_json("/blockheight").await
    }

    /// One page of the rune listing.
    pub async fn runes_page(&self, page: u64) -> reqwest::Result<RunesPage> {
        self.get_json(&format!("/runes/{page}")).await
    }

    /// The complete balances map.
    pub async fn runes_balances(&self) -> reqwest::Result<BalancesMap> {
        self.get_json("/runes/balances").await
    }

    /// Single rune entry by display name.
    pub async fn rune(&self, name: &str) -> reqwest::Result<RuneDetail> {
        self.get_json(&format!("/rune/{name}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rune_detail_decodes_ord_wire_shape() {
        let json = r#"{
            "number": 431,
            "mints": 0,
            "burned": 283951,
            "divisibility": 2,
            "premine": 11000000000,
            "spaced_rune": "Z.Z.Z.Z.Z.FEHU.Z.Z.Z.Z.Z",
            "symbol": "ᚠ",
            "turbo": false,
            "terms": {
                "amount": 100,
                "cap": 1111111,
                "height": [840000, 1050000],
                "offset": [null, null]
            }
        }"#;
        let detail: RuneDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.number, 431);
        assert_eq!(detail.symbol, Some('ᚠ'));
        let terms = detail.terms.unwrap();
        assert_eq!(terms.height, (Some(840000), Some(1050000)));
        assert_eq!(terms.offset, (None, None));
    }

    #[test]
    fn missing_terms_and_symbol_decode_to_none() {
        let json = r#"{
            "number": 0,
            "mints": 1,
            "burned": 0,
            "divisibility": 0,
            "premine": 0,
            "spaced_rune": "UNCOMMON.GOODS",
            "symbol": null,
            "turbo": true,
            "terms": null
        }"#;
        let detail: RuneDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.symbol, None);
        assert_eq!(detail.terms, None);
    }

    #[test]
    fn page_entries_are_keyed_by_composite_id() {
        let json = r#"{
            "more": true,
            "entries": [
                ["840000:3", {
                    "number": 2, "mints": 0, "burned": 0, "divisibility": 0,
                    "premine": 0, "spaced_rune": "AAA", "symbol": null,
                    "turbo": false, "terms": null
                }]
            ]
        }"#;
        let page: RunesPage = serde_json::from_str(json).unwrap();
        assert!(page.more);
        assert_eq!(page.entries[0].0, "840000:3");
        assert_eq!(page.entries[0].1.spaced_rune, "AAA");
    }
}
