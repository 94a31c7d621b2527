//! Word-overlap matching between free-form text and layer lexicons
//!
//! Provides:
//! - Lexicon parsing from the raw `words` column
//! - Text tokenization (lower-case, whitespace split, exact tokens)
//! - Per-layer match counts and the aggregate matched year range
//!
//! Everything here is pure: the same text and layer set always produce the
//! same [`MatchOutcome`], whatever order the layers arrive in.

use crate::db::models::Layer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Separators accepted between lexicon words
const LEXICON_SEPARATORS: [char; 3] = [',', ' ', ';'];

/// Parse a raw lexicon string into its set of lower-case words.
///
/// Splits on comma, space and semicolon, trims surrounding whitespace and
/// drops empty tokens. Idempotent: parsing the joined output again yields the
/// same set.
pub fn parse_lexicon(raw: &str) -> HashSet<String> {
    raw.split(&LEXICON_SEPARATORS[..])
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lower-case the text and split it on whitespace.
///
/// No stemming and no punctuation stripping: "чудо," is not "чудо".
pub fn tokenize_text(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// A layer whose lexicon overlapped the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMatch {
    pub layer_id: i64,
    pub match_count: i32,
}

/// Result of matching one text against a set of layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Match count for every active layer considered, keyed by layer id
    pub counts: BTreeMap<i64, i32>,

    /// Minimum `year_from` over matched layers
    pub year_from: Option<i32>,

    /// Maximum `year_to` over matched layers
    pub year_to: Option<i32>,

    /// Number of layers with a positive count
    pub matched_count: i32,
}

impl MatchOutcome {
    /// Layers with `match_count > 0`, ordered by layer id
    pub fn matches(&self) -> impl Iterator<Item = LayerMatch> + '_ {
        self.counts
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(&layer_id, &match_count)| LayerMatch {
                layer_id,
                match_count,
            })
    }
}

/// Match `text` against `layers`.
///
/// A layer's count is the number of its distinct lexicon words that occur
/// as an exact token in the text, not the number of occurrences. Inactive
/// layers are ignored. Year bounds are absent when nothing matched.
pub fn match_layers(text: &str, layers: &[Layer]) -> MatchOutcome {
    let tokens = tokenize_text(text);
    let mut outcome = MatchOutcome::default();

    if tokens.is_empty() {
        return outcome;
    }

    for layer in layers.iter().filter(|l| l.is_active()) {
        let count = layer
            .lexicon()
            .iter()
            .filter(|word| tokens.contains(*word))
            .count() as i32;

        outcome.counts.insert(layer.id, count);

        if count > 0 {
            outcome.matched_count += 1;
            outcome.year_from = Some(
                outcome
                    .year_from
                    .map_or(layer.year_from, |y| y.min(layer.year_from)),
            );
            outcome.year_to = Some(
                outcome
                    .year_to
                    .map_or(layer.year_to, |y| y.max(layer.year_to)),
            );
        }
    }

    outcome
}
