//! Fused ranking results.

use std::cmp::Ordering;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// A document selected by rank fusion.
///
/// Ordering is total: higher `score` first, then ascending `source`, then
/// ascending `id`. Sorting a slice of `RankDoc` therefore puts the best
/// document first. `rank` takes no part in ordering or equality.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct RankDoc {
    /// Document identifier.
    pub id: String,
    /// Index the document was retrieved from.
    pub source: String,
    /// Fused score.
    pub score: f32,
    /// 1-based position after fusion, unset until the fused order is final.
    pub rank: Option<u32>,
}

impl RankDoc {
    /// Create an unranked document.
    pub fn new(id: impl Into<String>, source: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            score,
            rank: None,
        }
    }

    /// Set the final rank.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }
}

impl Ord for RankDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankDoc {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankDoc {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_score_sorts_first() {
        let mut docs = vec![RankDoc::new("a", "idx", 0.1), RankDoc::new("b", "idx", 0.9)];
        docs.sort();
        assert_eq!(docs[0].id, "b");
    }

    #[test]
    fn test_ties_break_on_source_then_id() {
        let mut docs = vec![
            RankDoc::new("2", "books", 0.5),
            RankDoc::new("1", "books", 0.5),
            RankDoc::new("0", "articles", 0.5),
        ];
        docs.sort();
        let order: Vec<_> = docs.iter().map(|d| (d.source.as_str(), d.id.as_str())).collect();
        assert_eq!(order, vec![("articles", "0"), ("books", "1"), ("books", "2")]);
    }

    #[test]
    fn test_rank_ignored_by_equality() {
        let a = RankDoc::new("1", "idx", 0.5);
        let b = RankDoc::new("1", "idx", 0.5).with_rank(3);
        assert_eq!(a, b);
        assert_eq!(b.rank, Some(3));
    }
}
