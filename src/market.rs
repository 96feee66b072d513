use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable external identity of a subject, e.g. a username.
pub type SubjectId = String;

/// The cutoff, in the subject's native unit, that a market is betting on.
pub type Threshold = u64;

/// `(SubjectId, Threshold)` — a subject may have several markets at
/// different thresholds ("will screen time exceed 60 min today?" vs
/// "... exceed 120 min today?").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId {
    pub subject: SubjectId,
    pub threshold: Threshold,
}

impl MarketId {
    pub fn new(subject: impl Into<SubjectId>, threshold: Threshold) -> Self {
        Self {
            subject: subject.into(),
            threshold,
        }
    }

    /// Wire encoding: `"<subject>,<threshold>"`.
    pub fn code(&self) -> String {
        format!("{},{}", self.subject, self.threshold)
    }

    /// Parses the wire encoding produced by [`MarketId::code`].
    pub fn parse(s: &str) -> Option<Self> {
        let (subject, threshold) = s.rsplit_once(',')?;
        if subject.is_empty() {
            return None;
        }
        let threshold = threshold.parse().ok()?;
        Some(Self {
            subject: subject.to_string(),
            threshold,
        })
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
