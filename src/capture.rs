//! Snapshot builder
//!
//! Turns the indexer's paginated, partially redundant read API into the
//! canonical [`Snapshot`]. Two retrieval strategies exist in the field and
//! both are supported; they funnel into one assembly path so either
//! produces the same canonical shape, sorted outpoints included.

use crate::ord_client::{BalancesMap, OrdClient, RuneDetail, RunesPage};
use crate::rune_name::{parse_spaced_rune, RuneNameError};
use crate::snapshot::{sort_outpoints, Outpoint, RuneEntry, RuneTerms, Snapshot};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("indexer endpoint unavailable")]
    SourceUnavailable(#[from] reqwest::Error),
    #[error("rune {name:?}: undecodable display name")]
    BadRuneName {
        name: String,
        #[source]
        source: RuneNameError,
    },
    #[error("rune {name:?}: {detail}")]
    MalformedEntry { name: String, detail: String },
}

/// How to enumerate the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Page through the rune listing, join balances in by display name.
    LedgerFirst,
    /// Enumerate the balances map, fetch each rune's entry by name.
    BalanceFirst,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ledger-first" => Ok(Self::LedgerFirst),
            "balance-first" => Ok(Self::BalanceFirst),
            other => Err(format!(
                "unknown strategy {other:?} (expected ledger-first or balance-first)"
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LedgerFirst => "ledger-first",
            Self::BalanceFirst => "balance-first",
        })
    }
}

/// Read interface over a live indexer. The production implementation is
/// [`OrdClient`]; tests substitute an in-memory ledger.
#[async_trait]
pub trait LedgerSource: Sync {
    async fn runes_page(&self, page: u64) -> Result<RunesPage, CaptureError>;
    async fn runes_balances(&self) -> Result<BalancesMap, CaptureError>;
    async fn rune(&self, name: &str) -> Result<RuneDetail, CaptureError>;
}

#[async_trait]
impl LedgerSource for OrdClient {
    async fn runes_page(&self, page: u64) -> Result<RunesPage, CaptureError> {
        Ok(OrdClient::runes_page(self, page).await?)
    }

    async fn runes_balances(&self) -> Result<BalancesMap, CaptureError> {
        Ok(OrdClient::runes_balances(self).await?)
    }

    async fn rune(&self, name: &str) -> Result<RuneDetail, CaptureError> {
        Ok(OrdClient::rune(self, name).await?)
    }
}

/// Capture the complete ledger state at `height` from a ready indexer.
///
/// No partial snapshot escapes: the first source or decode failure aborts
/// the build. `fan_out` bounds concurrent per-rune fetches in balance-first
/// mode; ledger-first issues at most two requests at a time.
pub async fn build_snapshot<S: LedgerSource>(
    source: &S,
    height: u64,
    strategy: Strategy,
    fan_out: usize,
) -> Result<Snapshot, CaptureError> {
    let runes = match strategy {
        Strategy::LedgerFirst => ledger_first(source).await?,
        Strategy::BalanceFirst => balance_first(source, fan_out).await?,
    };
    Ok(Snapshot { height, runes })
}

/// Walk every page of the rune listing. Consecutive pages overlap by one
/// boundary entry, so every page after the first drops its head.
async fn fetch_all_pages<S: LedgerSource>(
    source: &S,
) -> Result<Vec<(String, RuneDetail)>, CaptureError> {
    let mut page = 0;
    let mut entries = Vec::new();

    loop {
        let data = source.runes_page(page).await?;
        let mut page_entries = data.entries;
        if page != 0 && !page_entries.is_empty() {
            page_entries.remove(0);
        }
        entries.extend(page_entries);
        if !data.more {
            break;
        }
        page += 1;
    }

    Ok(entries)
}

async fn ledger_first<S: LedgerSource>(source: &S) -> Result<Vec<RuneEntry>, CaptureError> {
    // Listing and balances hit independent read-only endpoints.
    let (entries, balances) =
        tokio::try_join!(fetch_all_pages(source), source.runes_balances())?;

    let mut runes = Vec::with_capacity(entries.len());
    for (id, detail) in &entries {
        runes.push(assemble_entry(id, detail, &balances)?);
    }

    // Fetch order is oldest-first; the canonical order is most recently
    // etched first.
    runes.reverse();
    Ok(runes)
}

async fn balance_first<S: LedgerSource>(
    source: &S,
    fan_out: usize,
) -> Result<Vec<RuneEntry>, CaptureError> {
    let balances = source.runes_balances().await?;

    let mut names: Vec<String> = balances.keys().cloned().collect();
    names.sort_unstable();

    let fetches = names.into_iter().map(|name| async move {
        let detail = source.rune(&name).await?;
        let id = detail.id.clone().ok_or_else(|| CaptureError::MalformedEntry {
            name: name.clone(),
            detail: "rune lookup response carries no etching id".to_string(),
        })?;
        Ok::<_, CaptureError>((id, detail))
    });
    let details: Vec<(String, RuneDetail)> = futures::stream::iter(fetches)
        .buffered(fan_out.max(1))
        .try_collect()
        .await?;

    let mut runes = Vec::with_capacity(details.len());
    for (id, detail) in &details {
        runes.push(assemble_entry(id, detail, &balances)?);
    }

    // The balances map has no inherent order; sort into the same
    // reverse-etching order the ledger-first walk produces.
    runes.sort_unstable_by(|a, b| b.number.cmp(&a.number));
    Ok(runes)
}

/// Build one canonical entry from its `"block:tx"` etching id, wire
/// detail, and the balances map. A rune that was etched but never
/// transferred gets an empty outpoint list, not a missing one.
fn assemble_entry(
    id: &str,
    detail: &RuneDetail,
    balances: &BalancesMap,
) -> Result<RuneEntry, CaptureError> {
    let (block, tx) = id
        .split_once(':')
        .and_then(|(b, t)| Some((b.parse::<u64>().ok()?, t.parse::<u32>().ok()?)))
        .ok_or_else(|| CaptureError::MalformedEntry {
            name: detail.spaced_rune.clone(),
            detail: format!("etching id {id:?} is not of the form block:tx"),
        })?;

    let (rune, spacers) = parse_spaced_rune(&detail.spaced_rune).map_err(|source| {
        CaptureError::BadRuneName {
            name: detail.spaced_rune.clone(),
            source,
        }
    })?;

    let mut outpoints = match balances.get(&detail.spaced_rune) {
        Some(entries) => entries
            .iter()
            .map(|(key, amount)| {
                Outpoint::from_balance_key(key, *amount).map_err(|e| {
                    CaptureError::MalformedEntry {
                        name: detail.spaced_rune.clone(),
                        detail: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    sort_outpoints(&mut outpoints);

    Ok(RuneEntry {
        number: detail.number,
        block,
        tx,
        minted: detail.mints,
        burned: detail.burned,
        divisibility: detail.divisibility,
        premine: detail.premine,
        rune: rune.to_string(),
        spacers,
        symbol: detail.symbol,
        turbo: detail.turbo,
        terms: detail.terms.as_ref().map(|t| RuneTerms {
            amount: t.amount,
            cap: t.cap,
            height_start: t.height.0,
            height_end: t.height.1,
            offset_start: t.offset.0,
            offset_end: t.offset.1,
        }),
        outpoints,
    })
}
