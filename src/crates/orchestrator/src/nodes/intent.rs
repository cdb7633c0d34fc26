//! Intent classification node
//!
//! A deterministic keyword classifier: the same message always produces the
//! same `(intent, confidence, entities)` triple, which is what makes the
//! anti-repetition short-circuit sound. Messages that match nothing classify
//! as smalltalk with low confidence, which the router turns into the
//! smalltalk fallback.

use agentgraph_core::{
    AgentNode, CapabilityMap, Intent, NodeContext, NodeError, NodeOutput, GraphState, StateField,
    StateMutator,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map};

const KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Summary,
        &[
            "summary", "summarize", "overview", "total", "totals", "financial", "income",
            "expenses", "balance",
        ],
    ),
    (
        Intent::Branch,
        &["branch", "branches", "office", "offices", "regional"],
    ),
    (
        Intent::Anomaly,
        &[
            "anomaly",
            "anomalies",
            "suspicious",
            "outlier",
            "outliers",
            "fraud",
            "irregular",
        ],
    ),
    (
        Intent::Document,
        &["write", "document", "save", "export", "overwrite"],
    ),
    (
        Intent::Database,
        &["query", "sql", "database", "select", "rows", "table"],
    ),
    (Intent::News, &["news", "headline", "headlines"]),
    (
        Intent::Greeting,
        &["hello", "hi", "hey", "morning", "afternoon", "evening"],
    ),
];

/// Pure classifier node; writes `intent`, `intent_confidence`, and
/// `response_metadata.semantic_result`
pub struct IntentNode {
    token_pattern: Regex,
    number_pattern: Regex,
}

impl IntentNode {
    pub fn new() -> Self {
        Self {
            token_pattern: Regex::new(r"[\p{Alphabetic}\d]+").expect("static pattern"),
            number_pattern: Regex::new(r"\d+(?:\.\d+)?").expect("static pattern"),
        }
    }

    /// Classify a message into `(intent, confidence, entities)`
    pub fn classify(&self, message: &str) -> (Intent, f64, Vec<String>) {
        let lowered = message.to_lowercase();
        let tokens: Vec<&str> = self
            .token_pattern
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .collect();

        let mut best: Option<(Intent, usize)> = None;
        for (intent, keywords) in KEYWORDS {
            let hits = keywords.iter().filter(|k| tokens.contains(k)).count();
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((*intent, hits));
            }
        }

        let entities: Vec<String> = self
            .number_pattern
            .find_iter(message)
            .map(|m| m.as_str().to_string())
            .collect();

        match best {
            Some((intent, hits)) => {
                let confidence = (0.4 + 0.15 * hits as f64).min(0.95);
                (intent, confidence, entities)
            }
            // Nothing recognizable: low-confidence smalltalk
            None => (Intent::Smalltalk, 0.1, entities),
        }
    }
}

impl Default for IntentNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentNode for IntentNode {
    async fn invoke(
        &self,
        state: &GraphState,
        _capabilities: &CapabilityMap,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let (intent, confidence, entities) = self.classify(&state.user_message);
        ctx.emit_progress(format!("intent: {intent} ({confidence:.2})"), None);

        let mutator = StateMutator::new();
        let mut next = mutator.set(state, StateField::Intent, json!(intent))?;
        next = mutator.set(&next, StateField::IntentConfidence, json!(confidence))?;

        let mut meta = Map::new();
        meta.insert("semantic_result".to_string(), json!(intent.as_str()));
        meta.insert("entities".to_string(), json!(entities));
        next = mutator.merge_mapping(&next, StateField::ResponseMetadata, meta)?;

        Ok(NodeOutput::new(next))
    }
}
