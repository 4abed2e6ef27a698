//! The word-count map and reduce functions
//!
//! These are the only application functions this coordinator runs. Both are
//! pure; simulated latency and retries live in the worker pool, not here.

use crate::job::{ReduceResult, ReduceTask};
use crate::partition::Chunk;
use std::collections::HashMap;

/// Count words in one chunk, lower-casing each whitespace token.
///
/// Every key in the result is non-empty and lower-cased with a count ≥ 1.
pub fn map_chunk(chunk: &Chunk) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for word in chunk.text.split_whitespace() {
        *counts.entry(word.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

/// Sum a word's shuffled contributions into its total.
///
/// The contributing mapper ids are kept in the order the shuffle grouped
/// them, for diagnostics.
pub fn reduce_word(task: &ReduceTask) -> ReduceResult {
    ReduceResult {
        word: task.word.clone(),
        total: task.entries.iter().map(|entry| entry.count).sum(),
        mapper_ids: task.entries.iter().map(|entry| entry.mapper_id).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Contribution;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            index: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn counts_repeated_words() {
        let counts = map_chunk(&chunk("hello world hello"));
        assert_eq!(counts.get("hello"), Some(&2));
        assert_eq!(counts.get("world"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn keys_are_lower_cased() {
        let counts = map_chunk(&chunk("Hello HELLO hello"));
        assert_eq!(counts.get("hello"), Some(&3));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn empty_chunk_produces_no_counts() {
        assert!(map_chunk(&chunk("")).is_empty());
    }

    #[test]
    fn reduce_sums_contributions_in_order() {
        let task = ReduceTask {
            word: "hello".to_string(),
            entries: vec![
                Contribution {
                    mapper_id: 2,
                    count: 1,
                },
                Contribution {
                    mapper_id: 0,
                    count: 3,
                },
            ],
        };
        let result = reduce_word(&task);
        assert_eq!(result.word, "hello");
        assert_eq!(result.total, 4);
        assert_eq!(result.mapper_ids, vec![2, 0]);
    }
}
