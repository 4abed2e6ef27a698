//! Shuffle: regroup per-mapper counts by word
//!
//! The only point where per-mapper results are merged. The merge is
//! order-independent and lossless: for every word, the sum of grouped
//! contributions equals the sum of that word's counts across all inputs.

use crate::error::{MapReduceError, MapReduceResult};
use crate::job::{Contribution, MapResult, ShuffleGroup};
use tracing::error;

/// Group map results by word.
///
/// Pure and synchronous; there is no runtime failure path. A malformed
/// `MapResult` (empty key, non-lower-cased key, zero count) is a defect in
/// the mapper and fails fast with `InvariantViolation`.
pub fn group(map_results: &[MapResult]) -> MapReduceResult<ShuffleGroup> {
    let mut groups = ShuffleGroup::new();

    for result in map_results {
        for (word, &count) in &result.counts {
            validate_pair(result.mapper_id, word, count)?;
            groups
                .entry(word.clone())
                .or_default()
                .push(Contribution {
                    mapper_id: result.mapper_id,
                    count,
                });
        }
    }

    Ok(groups)
}

fn validate_pair(mapper_id: usize, word: &str, count: u64) -> MapReduceResult<()> {
    let reason = if word.is_empty() {
        Some(format!("mapper {mapper_id} emitted an empty word key"))
    } else if word.chars().any(char::is_uppercase) {
        Some(format!(
            "mapper {mapper_id} emitted non-lower-cased key {word:?}"
        ))
    } else if count == 0 {
        Some(format!("mapper {mapper_id} emitted zero count for {word:?}"))
    } else {
        None
    };

    if let Some(reason) = reason {
        error!("shuffle invariant violated: {reason}");
        return Err(MapReduceError::InvariantViolation { reason });
    }
    Ok(())
}
