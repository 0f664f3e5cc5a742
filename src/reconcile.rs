//! Insert-only reconciliation of scraped candidates against persisted rows.
//!
//! A candidate is either new (its natural key is not stored yet for the owning
//! parent) or already known. Nothing is ever considered "changed".

use std::collections::HashSet;

/// The externally meaningful identifier used for deduplication.
pub trait NaturalKey {
    fn natural_key(&self) -> &str;
}

/// Keep the candidates whose natural key is not in `known`, in input order.
///
/// Repeated keys inside `candidates` are collapsed to their first occurrence,
/// so committing the result can never insert the same key twice.
pub fn new_records<R: NaturalKey>(candidates: Vec<R>, known: &HashSet<String>) -> Vec<R> {
    let mut seen: HashSet<String> = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| {
            let key = c.natural_key();
            !known.contains(key) && seen.insert(key.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Rec(&'static str);

    impl NaturalKey for Rec {
        fn natural_key(&self) -> &str {
            self.0
        }
    }

    fn known(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_preserves_input_order() {
        let delta = new_records(
            vec![Rec("d"), Rec("a"), Rec("c"), Rec("b")],
            &known(&["a"]),
        );
        assert_eq!(delta, vec![Rec("d"), Rec("c"), Rec("b")]);
    }

    #[test]
    fn test_second_pass_yields_nothing() {
        let first = new_records(vec![Rec("x"), Rec("y")], &HashSet::new());
        let stored: HashSet<String> = first.iter().map(|r| r.0.to_string()).collect();

        let second = new_records(vec![Rec("x"), Rec("y")], &stored);
        assert!(second.is_empty());
    }

    #[test]
    fn test_duplicates_within_batch_collapse() {
        let delta = new_records(vec![Rec("x"), Rec("y"), Rec("x")], &HashSet::new());
        assert_eq!(delta, vec![Rec("x"), Rec("y")]);
    }

    #[test]
    fn test_empty_candidates() {
        let delta: Vec<Rec> = new_records(Vec::new(), &known(&["a"]));
        assert!(delta.is_empty());
    }
}
