//! End-to-end: persist two snapshots, diff the files
//!
//! Exercises the full reference-vs-candidate comparison path: snapshots
//! written by two runs, read back as raw JSON trees, compared by the
//! structural differ.

use runediff::diff::diff;
use runediff::snapshot::{self, Outpoint, RuneEntry, RuneTerms, Snapshot};

const HASH: &str = "6fb1ac3ff1d32ab74f2ea1a8ebf0dd1b1817b1bbe320bee0ac1f0ed0ee37a478";

fn snapshot_840000() -> Snapshot {
    Snapshot {
        height: 840000,
        runes: vec![
            RuneEntry {
                number: 1,
                block: 840000,
                tx: 109,
                minted: 0,
                burned: 0,
                divisibility: 0,
                premine: 10000000,
                rune: "2055900680524219742".into(),
                spacers: 0,
                symbol: Some('$'),
                turbo: false,
                terms: None,
                outpoints: vec![Outpoint {
                    hash: HASH.into(),
                    index: 1,
                    amount: 100,
                }],
            },
            RuneEntry {
                number: 0,
                block: 1,
                tx: 0,
                minted: 0,
                burned: 0,
                divisibility: 0,
                premine: 0,
                rune: "0".into(),
                spacers: 0,
                symbol: None,
                turbo: true,
                terms: Some(RuneTerms {
                    amount: Some(1),
                    cap: None,
                    height_start: None,
                    height_end: None,
                    offset_start: None,
                    offset_end: None,
                }),
                outpoints: vec![],
            },
        ],
    }
}

#[test]
fn identical_runs_compare_equal() {
    let dir = tempfile::tempdir().unwrap();
    let state = snapshot_840000();
    let reference = state.save(dir.path(), "reference").unwrap();
    let candidate = state.save(dir.path(), "candidate").unwrap();

    let result = diff(
        &snapshot::load_value(&reference).unwrap(),
        &snapshot::load_value(&candidate).unwrap(),
    );
    assert!(result.equal);
}

#[test]
fn changed_outpoint_amount_is_pinpointed() {
    let dir = tempfile::tempdir().unwrap();
    let reference = snapshot_840000().save(dir.path(), "reference").unwrap();

    let mut tampered = snapshot_840000();
    tampered.runes[0].outpoints[0].amount = 101;
    let candidate = tampered.save(dir.path(), "candidate").unwrap();

    let result = diff(
        &snapshot::load_value(&reference).unwrap(),
        &snapshot::load_value(&candidate).unwrap(),
    );
    assert!(!result.equal);
    let divergence = result.divergence.unwrap();
    assert_eq!(divergence.path, "$.runes[0].outpoints[0].amount");
    assert_eq!(divergence.left, "\"100\"");
    assert_eq!(divergence.right, "\"101\"");
}

#[test]
fn outpoint_reorder_is_a_divergence() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = snapshot_840000();
    state.runes[0].outpoints.push(Outpoint {
        hash: HASH.into(),
        index: 2,
        amount: 5,
    });
    let reference = state.save(dir.path(), "reference").unwrap();

    state.runes[0].outpoints.reverse();
    let candidate = state.save(dir.path(), "candidate").unwrap();

    let result = diff(
        &snapshot::load_value(&reference).unwrap(),
        &snapshot::load_value(&candidate).unwrap(),
    );
    assert!(!result.equal);
    assert_eq!(
        result.divergence.unwrap().path,
        "$.runes[0].outpoints[0].index"
    );
}

#[test]
fn missing_rune_diverges_at_the_list() {
    let dir = tempfile::tempdir().unwrap();
    let reference = snapshot_840000().save(dir.path(), "reference").unwrap();

    let mut truncated = snapshot_840000();
    truncated.runes.pop();
    let candidate = truncated.save(dir.path(), "candidate").unwrap();

    let result = diff(
        &snapshot::load_value(&reference).unwrap(),
        &snapshot::load_value(&candidate).unwrap(),
    );
    assert_eq!(result.divergence.unwrap().path, "$.runes");
}
