//! Input partitioning for the map phase
//!
//! Splits raw text into ordered chunks on whitespace boundaries. The
//! concatenation of chunk texts in index order reproduces the original
//! whitespace-tokenized word sequence exactly.

use crate::error::{MapReduceError, MapReduceResult};
use serde::{Deserialize, Serialize};

/// A contiguous slice of the input assigned to one map task
///
/// Immutable once created; `index` is unique within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Split `text` into at most `mappers` chunks of whitespace-delimited words.
///
/// Chunk size is `ceil(word_count / mappers)`; the last chunk may be
/// shorter. When `mappers` exceeds the word count, trailing empty chunks
/// are omitted, so fewer than `mappers` chunks may be returned.
///
/// Pure function of its inputs. Fails with `EmptyInput` for whitespace-only
/// text and `InvalidConfig` when `mappers` is zero or above `max_mappers`.
pub fn split(text: &str, mappers: usize, max_mappers: usize) -> MapReduceResult<Vec<Chunk>> {
    if mappers == 0 {
        return Err(MapReduceError::InvalidConfig {
            reason: "mapper count must be at least 1".to_string(),
        });
    }
    if mappers > max_mappers {
        return Err(MapReduceError::InvalidConfig {
            reason: format!("mapper count {mappers} exceeds the configured maximum {max_mappers}"),
        });
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Err(MapReduceError::EmptyInput);
    }

    let chunk_size = words.len().div_ceil(mappers);
    let chunks = words
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk_words)| Chunk {
            index,
            text: chunk_words.join(" "),
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(split("", 3, 64), Err(MapReduceError::EmptyInput)));
        assert!(matches!(
            split("  \n\t ", 3, 64),
            Err(MapReduceError::EmptyInput)
        ));
    }

    #[test]
    fn zero_mappers_is_rejected() {
        let err = split("hello world", 0, 64).unwrap_err();
        assert!(matches!(err, MapReduceError::InvalidConfig { .. }));
    }

    #[test]
    fn mapper_count_above_maximum_is_rejected() {
        let err = split("hello world", 65, 64).unwrap_err();
        assert!(matches!(err, MapReduceError::InvalidConfig { .. }));
    }

    #[test]
    fn more_mappers_than_words_yields_fewer_chunks() {
        let chunks = split("one two three four", 10, 64).unwrap();
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.text.split_whitespace().count(), 1);
        }
    }

    #[test]
    fn chunk_sizes_follow_ceiling_division() {
        // 7 words across 3 mappers: ceil(7/3) = 3, so 3 + 3 + 1.
        let chunks = split("a b c d e f g", 3, 64).unwrap();
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|c| c.text.split_whitespace().count())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn concatenation_preserves_word_order() {
        let text = "the quick   brown\nfox jumps over\tthe lazy dog";
        let original: Vec<&str> = text.split_whitespace().collect();
        for mappers in 1..=original.len() + 2 {
            let Ok(chunks) = split(text, mappers, 64) else {
                panic!("split failed for {mappers} mappers");
            };
            let rejoined: Vec<String> = chunks
                .iter()
                .flat_map(|c| c.text.split_whitespace().map(str::to_string))
                .collect();
            assert_eq!(rejoined, original, "word order broken at n={mappers}");
        }
    }

    #[test]
    fn single_mapper_gets_everything() {
        let chunks = split("hello world hello", 1, 64).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world hello");
    }
}
