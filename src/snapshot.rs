//! Canonical rune ledger snapshot
//!
//! The snapshot is the unit of comparison between two indexer
//! implementations: every field, its type, and its position in the JSON
//! output are part of the equivalence contract. Struct field order below is
//! load-bearing — serde emits keys in declaration order and the differ
//! treats key order as significant.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minting policy attached to an etching. Absent bounds are explicit
/// `null` in the output, never omitted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneTerms {
    pub amount: Option<u128>,
    pub cap: Option<u128>,
    pub height_start: Option<u64>,
    pub height_end: Option<u64>,
    pub offset_start: Option<u64>,
    pub offset_end: Option<u64>,
}

/// One ledger ownership record: a transaction output holding some amount
/// of a rune.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    pub hash: String,
    pub index: u32,
    #[serde(with = "amount_string")]
    pub amount: u128,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceKeyError {
    #[error("balance key {key:?} is not of the form txhash:index")]
    MissingSeparator { key: String },
    #[error("balance key {key:?} has a non-hex transaction hash")]
    BadHash { key: String },
    #[error("balance key {key:?} has a non-numeric output index")]
    BadIndex { key: String },
}

impl Outpoint {
    /// Parse a `"txhash:index"` balance-map key into an outpoint.
    pub fn from_balance_key(key: &str, amount: u128) -> Result<Self, BalanceKeyError> {
        let (hash, index) = key.split_once(':').ok_or_else(|| {
            BalanceKeyError::MissingSeparator {
                key: key.to_string(),
            }
        })?;
        if hex::decode(hash).map(|h| h.len() != 32).unwrap_or(true) {
            return Err(BalanceKeyError::BadHash {
                key: key.to_string(),
            });
        }
        let index = index.parse::<u32>().map_err(|_| BalanceKeyError::BadIndex {
            key: key.to_string(),
        })?;
        Ok(Self {
            hash: hash.to_string(),
            index,
            amount,
        })
    }
}

/// Sort a rune's outpoints into canonical order: ascending by
/// `(hash, index)` with the index compared numerically.
pub fn sort_outpoints(outpoints: &mut [Outpoint]) {
    outpoints.sort_unstable_by(|a, b| a.hash.cmp(&b.hash).then(a.index.cmp(&b.index)));
}

/// One rune's complete state at a height.
///
/// `block`/`tx` come from the `"block:tx"` composite key of the etching;
/// `rune` is the decimal rendering of the bijective-numeral name value and
/// together with `spacers` replaces the display string entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneEntry {
    pub number: u64,
    pub block: u64,
    pub tx: u32,
    pub minted: u128,
    pub burned: u128,
    pub divisibility: u8,
    pub premine: u128,
    pub rune: String,
    pub spacers: u32,
    pub symbol: Option<char>,
    pub turbo: bool,
    pub terms: Option<RuneTerms>,
    pub outpoints: Vec<Outpoint>,
}

/// Complete captured ledger state at one block height. Immutable once
/// built; runes are in reverse-etching order (most recently etched first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub height: u64,
    pub runes: Vec<RuneEntry>,
}

impl Snapshot {
    /// Persist under `<states_dir>/<label>/<height>.json`, pretty-printed.
    /// Returns the written path.
    pub fn save(&self, states_dir: &Path, label: &str) -> std::io::Result<PathBuf> {
        let dir = states_dir.join(label);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.height));
        let json = serde_json::to_vec_pretty(self)?;
        let mut file = fs::File::create(&path)?;
        file.write_all(&json)?;
        file.flush()?;
        Ok(path)
    }

    /// Load a persisted snapshot. Accepts the `{height, runes}` envelope as
    /// well as the legacy bare-array files older capture runs produced; for
    /// the latter the height is recovered from the `<height>.json` file
    /// name.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = fs::read(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_slice(&raw)
            .with_context(|| format!("snapshot {} is not valid JSON", path.display()))?;
        if value.is_array() {
            let runes: Vec<RuneEntry> = serde_json::from_value(value)
                .with_context(|| format!("bad legacy snapshot {}", path.display()))?;
            let height = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
                .with_context(|| {
                    format!(
                        "legacy snapshot {} has no height in its file name",
                        path.display()
                    )
                })?;
            Ok(Self { height, runes })
        } else {
            serde_json::from_value(value)
                .with_context(|| format!("bad snapshot {}", path.display()))
        }
    }
}

/// Read a snapshot file as a raw JSON tree, key order preserved. This is
/// what the differ consumes: comparing the persisted bytes' structure, not
/// the typed model.
pub fn load_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    use anyhow::Context;
    let raw =
        fs::read(path).with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("snapshot {} is not valid JSON", path.display()))
}

/// Outpoint amounts ride as decimal strings so no JSON consumer can round
/// them through a double.
mod amount_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map_err(|_| de::Error::custom(format!("bad amount {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "6fb1ac3ff1d32ab74f2ea1a8ebf0dd1b1817b1bbe320bee0ac1f0ed0ee37a478";
    const HASH_B: &str = "e5a3ff92e74e92e4011251b8e72e9b3aa4b53e5f08e33dabbcbfc5c30c79e60b";

    #[test]
    fn balance_key_parses() {
        let op = Outpoint::from_balance_key(&format!("{HASH_A}:7"), 100).unwrap();
        assert_eq!(op.hash, HASH_A);
        assert_eq!(op.index, 7);
        assert_eq!(op.amount, 100);
    }

    #[test]
    fn balance_key_rejects_garbage() {
        assert!(matches!(
            Outpoint::from_balance_key("nocolonhere", 1),
            Err(BalanceKeyError::MissingSeparator { .. })
        ));
        assert!(matches!(
            Outpoint::from_balance_key("zzzz:0", 1),
            Err(BalanceKeyError::BadHash { .. })
        ));
        assert!(matches!(
            Outpoint::from_balance_key(&format!("{HASH_A}:x"), 1),
            Err(BalanceKeyError::BadIndex { .. })
        ));
    }

    #[test]
    fn outpoint_sort_is_numeric_on_index() {
        let mut ops = vec![
            Outpoint { hash: HASH_B.into(), index: 0, amount: 1 },
            Outpoint { hash: HASH_A.into(), index: 10, amount: 2 },
            Outpoint { hash: HASH_A.into(), index: 2, amount: 3 },
        ];
        sort_outpoints(&mut ops);
        // Lexical index comparison would put "10" before "2".
        assert_eq!(ops[0].index, 2);
        assert_eq!(ops[1].index, 10);
        assert_eq!(ops[2].hash, HASH_B);
    }

    #[test]
    fn amount_serializes_as_string() {
        let op = Outpoint {
            hash: HASH_A.into(),
            index: 0,
            amount: 340282366920938463463374607431768211455,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json["amount"],
            serde_json::Value::String("340282366920938463463374607431768211455".into())
        );
        let back: Outpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn entry_key_order_is_canonical() {
        let entry = RuneEntry {
            number: 0,
            block: 840000,
            tx: 1,
            minted: 0,
            burned: 0,
            divisibility: 2,
            premine: 11000000000,
            rune: "67090369340599840949".into(),
            spacers: 128,
            symbol: Some('\u{29C9}'),
            turbo: true,
            terms: None,
            outpoints: vec![],
        };
        let json = serde_json::to_value(&entry).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            [
                "number", "block", "tx", "minted", "burned", "divisibility", "premine",
                "rune", "spacers", "symbol", "turbo", "terms", "outpoints"
            ]
        );
    }

    #[test]
    fn absent_terms_fields_are_null_not_missing() {
        let terms = RuneTerms {
            amount: Some(100),
            cap: None,
            height_start: None,
            height_end: None,
            offset_start: None,
            offset_end: None,
        };
        let json = serde_json::to_value(&terms).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert!(obj["cap"].is_null());
        assert!(obj["offset_end"].is_null());
    }

    #[test]
    fn save_then_load_round_trips_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            height: 840000,
            runes: vec![],
        };
        let path = snapshot.save(dir.path(), "reference").unwrap();
        assert!(path.ends_with("reference/840000.json"));
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
    }

    #[test]
    fn legacy_bare_array_loads_with_height_from_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("840000.json");
        fs::write(&path, "[]").unwrap();
        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(snapshot.height, 840000);
        assert!(snapshot.runes.is_empty());
    }
}
