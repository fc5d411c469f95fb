//! Accept/reject feedback bookkeeping
//!
//! Accept and reject are mutually exclusive per candidate: recording one
//! disposition drops any record of the other. Every record is also appended to
//! an ordered history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User verdict on a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Accepted,
    Rejected,
}

/// One piece of user feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub candidate_id: String,
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(candidate_id: impl Into<String>, disposition: Disposition) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            disposition,
            rating: None,
            timestamp: Utc::now(),
        }
    }

    pub fn accept(candidate_id: impl Into<String>) -> Self {
        Self::new(candidate_id, Disposition::Accepted)
    }

    pub fn reject(candidate_id: impl Into<String>) -> Self {
        Self::new(candidate_id, Disposition::Rejected)
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Current dispositions plus full history
#[derive(Debug, Clone, Default)]
pub struct FeedbackLedger {
    accepted: HashMap<String, FeedbackRecord>,
    rejected: HashMap<String, FeedbackRecord>,
    history: Vec<FeedbackRecord>,
}

impl FeedbackLedger {
    /// Record a disposition, replacing the opposite one if present
    pub fn record(&mut self, record: FeedbackRecord) {
        let id = record.candidate_id.clone();
        match record.disposition {
            Disposition::Accepted => {
                self.rejected.remove(&id);
                self.accepted.insert(id, record.clone());
            }
            Disposition::Rejected => {
                self.accepted.remove(&id);
                self.rejected.insert(id, record.clone());
            }
        }
        self.history.push(record);
    }

    pub fn disposition(&self, candidate_id: &str) -> Option<Disposition> {
        if self.accepted.contains_key(candidate_id) {
            Some(Disposition::Accepted)
        } else if self.rejected.contains_key(candidate_id) {
            Some(Disposition::Rejected)
        } else {
            None
        }
    }

    pub fn is_accepted(&self, candidate_id: &str) -> bool {
        self.accepted.contains_key(candidate_id)
    }

    pub fn is_rejected(&self, candidate_id: &str) -> bool {
        self.rejected.contains_key(candidate_id)
    }

    /// Latest record for a candidate, whichever disposition it has
    pub fn current(&self, candidate_id: &str) -> Option<&FeedbackRecord> {
        self.accepted
            .get(candidate_id)
            .or_else(|| self.rejected.get(candidate_id))
    }

    pub fn accepted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.accepted.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn rejected_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.rejected.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn history(&self) -> &[FeedbackRecord] {
        &self.history
    }
}
