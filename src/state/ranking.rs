//! Candidate ranking policy
//!
//! The "best" candidate is the one with the highest combined score. Ties go to
//! the earliest arrival, and candidates without a usable score rank last.
//!
//! Presentation sorts are separate: they return a borrowed view and never
//! touch stored order or selection.

use super::candidate::Candidate;

/// Key for presentation-only re-sorting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Arrival order (stored order)
    Arrival,
    /// `scores.combined`, descending
    Combined,
    /// `uncertaintyScores.confidence`, descending
    Confidence,
    /// A named entry in `scores`, descending
    Score(String),
}

fn rank_value(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NEG_INFINITY)
}

/// Pick the best candidate: highest combined score, first arrival wins ties
pub fn best_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut iter = candidates.iter();
    let mut best = iter.next()?;
    let mut best_value = rank_value(best.combined_score());

    for candidate in iter {
        let value = rank_value(candidate.combined_score());
        // Strictly greater keeps the earlier arrival on ties
        if value > best_value {
            best = candidate;
            best_value = value;
        }
    }

    Some(best)
}

/// Sorted view of the candidates for display
///
/// The sort is stable, so equal keys keep arrival order.
pub fn sorted_view<'a>(candidates: &'a [Candidate], key: &SortKey) -> Vec<&'a Candidate> {
    let mut view: Vec<&Candidate> = candidates.iter().collect();

    let value_of = |c: &Candidate| -> f64 {
        match key {
            SortKey::Arrival => 0.0,
            SortKey::Combined => rank_value(c.combined_score()),
            SortKey::Confidence => rank_value(c.confidence()),
            SortKey::Score(name) => rank_value(c.score(name)),
        }
    };

    if *key != SortKey::Arrival {
        view.sort_by(|a, b| value_of(b).total_cmp(&value_of(a)));
    }

    view
}
