//! Action taxonomy for progress events
//!
//! Actions are the stable, enumerable labels a UI maps to localized progress
//! messages. The set is closed; anything a node cannot express with a known
//! label uses [`Action::Other`]. Free-string actions from the wire parse to
//! `Other` rather than failing.

use serde::{Deserialize, Serialize};

/// Semantic label attached to every progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    IntentIdentify,
    ContextEvaluate,
    ReasoningPlan,
    RouteSelect,
    DatabaseQuery,
    SummaryGeneration,
    BranchAnalysis,
    AnomalyDetection,
    DocumentWrite,
    HumanGateWait,
    AssembleResponse,
    Finalize,
    AgentEnd,
    #[default]
    Other,
}

impl Action {
    /// Wire label for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::IntentIdentify => "intent_identify",
            Action::ContextEvaluate => "context_evaluate",
            Action::ReasoningPlan => "reasoning_plan",
            Action::RouteSelect => "route_select",
            Action::DatabaseQuery => "database_query",
            Action::SummaryGeneration => "summary_generation",
            Action::BranchAnalysis => "branch_analysis",
            Action::AnomalyDetection => "anomaly_detection",
            Action::DocumentWrite => "document_write",
            Action::HumanGateWait => "human_gate_wait",
            Action::AssembleResponse => "assemble_response",
            Action::Finalize => "finalize",
            Action::AgentEnd => "agent_end",
            Action::Other => "other",
        }
    }

    /// Parse a wire label; unknown labels collapse to [`Action::Other`]
    pub fn from_label(label: &str) -> Self {
        match label {
            "intent_identify" => Action::IntentIdentify,
            "context_evaluate" => Action::ContextEvaluate,
            "reasoning_plan" => Action::ReasoningPlan,
            "route_select" => Action::RouteSelect,
            "database_query" => Action::DatabaseQuery,
            "summary_generation" => Action::SummaryGeneration,
            "branch_analysis" => Action::BranchAnalysis,
            "anomaly_detection" => Action::AnomalyDetection,
            "document_write" => Action::DocumentWrite,
            "human_gate_wait" => Action::HumanGateWait,
            "assemble_response" => Action::AssembleResponse,
            "finalize" => Action::Finalize,
            "agent_end" => Action::AgentEnd,
            _ => Action::Other,
        }
    }

    /// Default action for a node name, used when a transition is emitted
    /// before the node itself has declared anything
    pub fn for_node(node: &str) -> Self {
        match node {
            "intent" => Action::IntentIdentify,
            "supervisor" => Action::ContextEvaluate,
            "reasoning" => Action::ReasoningPlan,
            "router" => Action::RouteSelect,
            "database" => Action::DatabaseQuery,
            "summary" => Action::SummaryGeneration,
            "branch" => Action::BranchAnalysis,
            "anomaly" => Action::AnomalyDetection,
            "document_write" => Action::DocumentWrite,
            "human_gate" => Action::HumanGateWait,
            "assemble" => Action::AssembleResponse,
            "finalize" => Action::Finalize,
            _ => Action::Other,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for action in [
            Action::IntentIdentify,
            Action::ReasoningPlan,
            Action::RouteSelect,
            Action::SummaryGeneration,
            Action::HumanGateWait,
            Action::Finalize,
        ] {
            assert_eq!(Action::from_label(action.as_str()), action);
        }
    }

    #[test]
    fn test_unknown_label_is_other() {
        assert_eq!(Action::from_label("made_up_label"), Action::Other);
    }

    #[test]
    fn test_node_mapping() {
        assert_eq!(Action::for_node("intent"), Action::IntentIdentify);
        assert_eq!(Action::for_node("finalize"), Action::Finalize);
        assert_eq!(Action::for_node("smalltalk"), Action::Other);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Action::SummaryGeneration).unwrap();
        assert_eq!(json, "\"summary_generation\"");
    }
}
