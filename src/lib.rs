//! runediff - Differential verification harness for Bitcoin Runes indexers
//!
//! Drives an external Runes indexer (ord or a candidate reimplementation)
//! through index-update/serve cycles, captures canonical ledger snapshots
//! per block height, and compares independently produced snapshots for
//! exact structural equivalence.

/// Spaced rune name codec (bijective base-26 + spacer bitmask)
pub mod rune_name;

/// Canonical snapshot model and persistence
pub mod snapshot;

/// Typed client for the indexer's HTTP API
pub mod ord_client;

/// Snapshot builder over a live indexer endpoint
pub mod capture;

/// Indexer subprocess lifecycle control
pub mod ord_process;

/// Sequential height iteration
pub mod driver;

/// Order-sensitive structural differ
pub mod diff;

/// Lifecycle progress events and reporting
pub mod events;
