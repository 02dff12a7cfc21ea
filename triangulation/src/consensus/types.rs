//! Arbitration output types.

use serde::{Deserialize, Serialize};

use crate::analysis::StanceClaim;

/// Discrete confidence derived from inter-model agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    /// No provider returned a usable claim.
    Unknown,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Final stance for one (candidate, issue) pair.
///
/// Immutable once arbitration completes. An `unknown` stance is a valid
/// result and must be published, not dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueStance {
    pub issue: String,
    pub candidate: String,
    /// Representative claim text, verbatim; empty when unknown.
    pub stance_text: String,
    pub confidence: ConfidenceLevel,
    /// Chunk ids cited by the majority group, first-cited order, no repeats.
    pub sources: Vec<String>,
    /// Claims outside the majority group, in provider order.
    pub minority_views: Vec<StanceClaim>,
    /// Claims that reached arbitration.
    pub providers_responding: usize,
    /// Size of the majority group.
    pub providers_agreeing: usize,
    /// Provider whose claim was selected as representative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representative_provider: Option<String>,
}

impl IssueStance {
    /// Stance for an issue with no usable claims.
    pub fn unknown(candidate: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            candidate: candidate.into(),
            stance_text: String::new(),
            confidence: ConfidenceLevel::Unknown,
            sources: Vec::new(),
            minority_views: Vec::new(),
            providers_responding: 0,
            providers_agreeing: 0,
            representative_provider: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.confidence == ConfidenceLevel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConfidenceLevel::Medium).unwrap(),
            "\"medium\""
        );
        assert_eq!(ConfidenceLevel::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_unknown_stance_shape() {
        let stance = IssueStance::unknown("Jane Doe", "Healthcare");
        assert!(stance.is_unknown());
        assert!(stance.stance_text.is_empty());
        assert!(stance.sources.is_empty());
        assert!(stance.minority_views.is_empty());

        let json = serde_json::to_value(&stance).unwrap();
        assert_eq!(json["confidence"], "unknown");
        assert!(json.get("representative_provider").is_none());
    }
}
