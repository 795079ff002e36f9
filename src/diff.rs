//! Structural snapshot differ
//!
//! Order- and type-sensitive deep equality over JSON trees. Two snapshots
//! are equivalent only if they agree on every value, every sequence order,
//! and every object key order; the first divergence found (depth-first,
//! left-to-right) is reported with its path. Exhaustive enumeration is
//! deliberately out of scope: one precise path is what regression triage
//! needs.

use serde_json::Value;
use std::fmt;

/// First point at which two trees disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Dot/bracket path, `$` for the root.
    pub path: String,
    pub left: String,
    pub right: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "divergence at {}: {} vs {}",
            self.path, self.left, self.right
        )
    }
}

/// Outcome of a comparison. A divergence is the intended output of a
/// failed comparison, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub equal: bool,
    pub divergence: Option<Divergence>,
}

/// Compare two JSON trees for exact structural equivalence.
///
/// Requires values parsed with key order preserved (this crate builds
/// serde_json with `preserve_order`); without it, two files with reordered
/// keys would be indistinguishable here.
pub fn diff(a: &Value, b: &Value) -> DiffResult {
    match compare(a, b, "$") {
        None => DiffResult {
            equal: true,
            divergence: None,
        },
        Some(divergence) => DiffResult {
            equal: false,
            divergence: Some(divergence),
        },
    }
}

fn compare(a: &Value, b: &Value, path: &str) -> Option<Divergence> {
    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return Some(Divergence {
                    path: path.to_string(),
                    left: format!("array of {} elements", xs.len()),
                    right: format!("array of {} elements", ys.len()),
                });
            }
            for (i, (x, y)) in xs.iter().zip(ys).enumerate() {
                if let Some(d) = compare(x, y, &format!("{path}[{i}]")) {
                    return Some(d);
                }
            }
            None
        }
        (Value::Object(xs), Value::Object(ys)) => {
            if xs.len() != ys.len() {
                return Some(Divergence {
                    path: path.to_string(),
                    left: format!("object with {} keys", xs.len()),
                    right: format!("object with {} keys", ys.len()),
                });
            }
            // Keys are compared positionally: same pairs in a different
            // insertion order are a divergence, since the contract is
            // exact output reproducibility rather than semantic equality.
            for (i, ((ka, va), (kb, vb))) in xs.iter().zip(ys).enumerate() {
                if ka != kb {
                    return Some(Divergence {
                        path: path.to_string(),
                        left: format!("key {ka:?} at position {i}"),
                        right: format!("key {kb:?} at position {i}"),
                    });
                }
                if let Some(d) = compare(va, vb, &format!("{path}.{ka}")) {
                    return Some(d);
                }
            }
            None
        }
        // Scalars and mismatched container kinds: exact equality, no
        // coercion between numbers, strings, or bools.
        _ => {
            if a != b {
                Some(Divergence {
                    path: path.to_string(),
                    left: render(a),
                    right: render(b),
                })
            } else {
                None
            }
        }
    }
}

fn render(v: &Value) -> String {
    match v {
        Value::Array(xs) => format!("array of {} elements", xs.len()),
        Value::Object(xs) => format!("object with {} keys", xs.len()),
        scalar => scalar.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_trees_are_equal() {
        let v = json!({
            "height": 840000,
            "runes": [{"number": 0, "outpoints": [{"amount": "100"}]}]
        });
        let result = diff(&v, &v);
        assert!(result.equal);
        assert!(result.divergence.is_none());
    }

    #[test]
    fn scalar_mismatch_reports_exact_path() {
        let a = json!({"runes": [{"outpoints": [{"amount": "100"}]}]});
        let b = json!({"runes": [{"outpoints": [{"amount": "101"}]}]});
        let d = diff(&a, &b).divergence.unwrap();
        assert_eq!(d.path, "$.runes[0].outpoints[0].amount");
        assert_eq!(d.left, "\"100\"");
        assert_eq!(d.right, "\"101\"");
    }

    #[test]
    fn array_length_diverges_at_container() {
        let a = json!([1, 2, 3]);
        let b = json!([1, 2]);
        let d = diff(&a, &b).divergence.unwrap();
        assert_eq!(d.path, "$");
    }

    #[test]
    fn key_order_is_significant() {
        // preserve_order keeps these two objects distinguishable.
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        let d = diff(&a, &b).divergence.unwrap();
        assert_eq!(d.path, "$");
        assert!(d.left.contains("\"x\""));
        assert!(d.right.contains("\"y\""));
    }

    #[test]
    fn sequence_order_is_significant() {
        let a = json!([{"hash": "aa", "index": 0}, {"hash": "bb", "index": 1}]);
        let b = json!([{"hash": "bb", "index": 1}, {"hash": "aa", "index": 0}]);
        let d = diff(&a, &b).divergence.unwrap();
        assert_eq!(d.path, "$[0].hash");
    }

    #[test]
    fn no_type_coercion_between_scalars() {
        assert!(!diff(&json!(1), &json!(1.0)).equal);
        assert!(!diff(&json!(1), &json!("1")).equal);
        assert!(!diff(&json!(null), &json!(0)).equal);
        assert!(!diff(&json!(true), &json!(1)).equal);
    }

    #[test]
    fn mismatched_container_kinds_diverge() {
        let d = diff(&json!([]), &json!({})).divergence.unwrap();
        assert_eq!(d.path, "$");
        assert_eq!(d.left, "array of 0 elements");
        assert_eq!(d.right, "object with 0 keys");
    }

    #[test]
    fn first_divergence_wins_depth_first() {
        let a = json!({"a": [1, 9], "b": 1});
        let b = json!({"a": [1, 2], "b": 2});
        let d = diff(&a, &b).divergence.unwrap();
        assert_eq!(d.path, "$.a[1]");
    }
}
