use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: i64,
    pub title: String,
    pub identifier: String,
    pub background: String,
    pub objectives: String,
    pub priority_areas: String,
    pub funding_details: String,
    pub timeline: String,
}

impl Call {
    /// Splits the raw priority-areas text on commas and newlines, trimmed,
    /// empties dropped.
    pub fn priority_area_list(&self) -> Vec<String> {
        self.priority_areas
            .replace('\n', ",")
            .split(',')
            .map(str::trim)
            .filter(|area| !area.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProposalStatus {
    UnderReview,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderReview => "Under Review",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Under Review" => Some(Self::UnderReview),
            "Accepted" => Some(Self::Accepted),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    pub title: String,
    pub abstract_text: String,
    pub keywords: String,
    pub proposal_text: String,
    pub call_id: i64,
    pub status: ProposalStatus,
    pub submitted_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub expertise: String,
    /// Plain text extracted once from the uploaded CV at registration time.
    pub cv_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Researcher {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub expertise: String,
}

/// Persisted link between one proposal and one reviewer. At most one row
/// exists per (proposal, reviewer) pair; rows are owned by their proposal
/// and deleted with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub proposal_id: i64,
    pub reviewer_id: i64,
    pub similarity_score: f32,
    pub explanation: String,
    pub anonymized: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewScore {
    pub id: i64,
    pub proposal_id: i64,
    pub reviewer_id: i64,
    pub originality: f32,
    pub methodology: f32,
    pub impact: f32,
    pub feasibility: f32,
    pub overall: f32,
    pub comments: String,
}

/// Free-text reviewing criteria attached to a call. `area` scopes the
/// entry to one of the call's priority areas; `None` applies call-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCriteria {
    pub id: i64,
    pub call_id: i64,
    pub area: Option<String>,
    pub criteria: String,
}

/// One ranked candidate produced by the suggestion engine. Pure value —
/// persisting it as an [`Assignment`] is a separate, explicit confirm step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerSuggestion {
    pub reviewer_id: i64,
    pub reviewer_name: String,
    /// Cosine similarity in [-1, 1] between the proposal signal and the
    /// reviewer's CV text.
    pub score: f32,
    pub matched_areas: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewCall {
    pub title: String,
    pub identifier: String,
    pub background: String,
    pub objectives: String,
    pub priority_areas: String,
    pub funding_details: String,
    pub timeline: String,
}

#[derive(Debug, Clone)]
pub struct NewReviewer {
    pub name: String,
    pub email: String,
    pub password: String,
    pub expertise: String,
    pub cv_text: String,
}

#[derive(Debug, Clone)]
pub struct NewResearcher {
    pub name: String,
    pub email: String,
    pub password: String,
    pub expertise: String,
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub title: String,
    pub abstract_text: String,
    pub keywords: String,
    pub proposal_text: String,
    pub call_id: i64,
    pub submitted_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub proposal_id: i64,
    pub reviewer_id: i64,
    pub originality: f32,
    pub methodology: f32,
    pub impact: f32,
    pub feasibility: f32,
    pub comments: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DashboardStats {
    pub calls: usize,
    pub proposals: usize,
    pub reviewers: usize,
    pub assignments: usize,
}

#[cfg(test)]
mod tests {
    use super::{Call, ProposalStatus};

    fn call_with_areas(raw: &str) -> Call {
        Call {
            id: 1,
            title: "Climate Resilience".to_string(),
            identifier: "CR-2026".to_string(),
            background: String::new(),
            objectives: String::new(),
            priority_areas: raw.to_string(),
            funding_details: String::new(),
            timeline: String::new(),
        }
    }

    #[test]
    fn priority_areas_split_on_commas_and_newlines() {
        let call = call_with_areas("AI, Agriculture\nWater Security, ");
        assert_eq!(
            call.priority_area_list(),
            vec!["AI", "Agriculture", "Water Security"]
        );
    }

    #[test]
    fn priority_areas_empty_text_yields_no_areas() {
        let call = call_with_areas("  \n ");
        assert!(call.priority_area_list().is_empty());
    }

    #[test]
    fn proposal_status_round_trips_as_text() {
        for status in [
            ProposalStatus::UnderReview,
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
        ] {
            assert_eq!(ProposalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProposalStatus::parse("Withdrawn"), None);
    }
}
