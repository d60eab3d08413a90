//! Destination resolution against the prefix index

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::consts::META_ANY;
use crate::traits::DestinationIndex;
use crate::AppResult;

/// A dialled number resolved to destination ids, longest prefix first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDestination {
    /// The dialled number
    pub number: String,
    /// `(prefix length, destination ids)` pairs, longest prefix first
    pub matches: Vec<(usize, Vec<String>)>,
}

impl ResolvedDestination {
    /// Walk every prefix of `number` down to `min_prefix` characters
    pub fn resolve(
        index: &dyn DestinationIndex,
        number: &str,
        min_prefix: usize,
    ) -> AppResult<Self> {
        let mut matches = Vec::new();
        let chars: Vec<(usize, char)> = number.char_indices().collect();
        for len in (min_prefix.max(1)..=chars.len()).rev() {
            let end = chars
                .get(len)
                .map(|(byte, _)| *byte)
                .unwrap_or(number.len());
            let ids = index.destination_ids(&number[..end])?;
            if !ids.is_empty() {
                matches.push((len, ids));
            }
        }
        Ok(Self {
            number: number.to_string(),
            matches,
        })
    }

    /// Precision of the longest prefix whose ids intersect `destination_ids`.
    ///
    /// An empty set or one holding `*any` matches with precision 0.
    pub fn precision_for(&self, destination_ids: &BTreeSet<String>) -> Option<usize> {
        if destination_ids.is_empty() || destination_ids.contains(META_ANY) {
            return Some(0);
        }
        self.matches
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| destination_ids.contains(id)))
            .map(|(len, _)| *len)
    }

    /// Every destination id the number resolves to
    pub fn all_ids(&self) -> BTreeSet<&str> {
        self.matches
            .iter()
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect()
    }
}
