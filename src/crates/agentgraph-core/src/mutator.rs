//! The sole legal mechanism for producing new state snapshots
//!
//! Every write the runtime or a node performs goes through
//! [`StateMutator`]. Each operation takes a `&GraphState`, validates the
//! target field and value shape, and returns a *new* snapshot with
//! `updated_at` refreshed. A failed operation never corrupts the input - the
//! caller still holds the unchanged snapshot it passed in.
//!
//! Field names are closed over the [`StateField`] enum: writing an
//! undeclared field is [`StateError::InvalidField`], writing a value of the
//! wrong shape is [`StateError::TypeMismatch`]. This is the audit point the
//! checkpointing and hashing layers rely on - there is no other way to
//! produce a snapshot the runtime will persist.
//!
//! # Operations
//!
//! | Operation | Fields | Behavior |
//! |---|---|---|
//! | [`set`](StateMutator::set) | any schema field | replace one field |
//! | [`merge_mapping`](StateMutator::merge_mapping) | `agent_results`, `response_metadata`, `hashes` | key-by-key overwrite, insertion order kept for new keys |
//! | [`append`](StateMutator::append) | `completed_nodes`, `plan`, `pending_tasks` | push one element |
//! | [`advance`](StateMutator::advance) | - | move to a node: shift `current_node` to `previous_node`, bump `step`, append the departed node to `completed_nodes` |

use crate::state::{GraphState, Intent, PlanStep, StateError, StateHashes, TaskItem};
use serde_json::{Map, Value};

/// All writable fields of [`GraphState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    UserMessage,
    Intent,
    IntentConfidence,
    Plan,
    RoutingDecision,
    PendingTasks,
    AgentResults,
    ResponseMetadata,
    CompletedNodes,
    CurrentNode,
    PreviousNode,
    Status,
    Step,
    Hashes,
    HumanGateReason,
    ResumeToken,
}

impl StateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateField::UserMessage => "user_message",
            StateField::Intent => "intent",
            StateField::IntentConfidence => "intent_confidence",
            StateField::Plan => "plan",
            StateField::RoutingDecision => "routing_decision",
            StateField::PendingTasks => "pending_tasks",
            StateField::AgentResults => "agent_results",
            StateField::ResponseMetadata => "response_metadata",
            StateField::CompletedNodes => "completed_nodes",
            StateField::CurrentNode => "current_node",
            StateField::PreviousNode => "previous_node",
            StateField::Status => "status",
            StateField::Step => "step",
            StateField::Hashes => "hashes",
            StateField::HumanGateReason => "human_gate_reason",
            StateField::ResumeToken => "resume_token",
        }
    }

    /// Resolve a field name; unknown names are [`StateError::InvalidField`]
    pub fn parse(name: &str) -> Result<Self, StateError> {
        match name {
            "user_message" => Ok(StateField::UserMessage),
            "intent" => Ok(StateField::Intent),
            "intent_confidence" => Ok(StateField::IntentConfidence),
            "plan" => Ok(StateField::Plan),
            "routing_decision" => Ok(StateField::RoutingDecision),
            "pending_tasks" => Ok(StateField::PendingTasks),
            "agent_results" => Ok(StateField::AgentResults),
            "response_metadata" => Ok(StateField::ResponseMetadata),
            "completed_nodes" => Ok(StateField::CompletedNodes),
            "current_node" => Ok(StateField::CurrentNode),
            "previous_node" => Ok(StateField::PreviousNode),
            "status" => Ok(StateField::Status),
            "step" => Ok(StateField::Step),
            "hashes" => Ok(StateField::Hashes),
            "human_gate_reason" => Ok(StateField::HumanGateReason),
            "resume_token" => Ok(StateField::ResumeToken),
            other => Err(StateError::InvalidField(other.to_string())),
        }
    }
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless mutation helper; see the [module documentation](self)
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMutator;

impl StateMutator {
    pub fn new() -> Self {
        Self
    }

    /// Replace one field, returning the new snapshot
    pub fn set(
        &self,
        state: &GraphState,
        field: StateField,
        value: Value,
    ) -> Result<GraphState, StateError> {
        let mut next = state.clone();
        match field {
            StateField::UserMessage => next.user_message = typed(field, value, "string")?,
            StateField::Intent => {
                next.intent = typed::<Intent>(field, value, "intent label")?;
            }
            StateField::IntentConfidence => {
                let confidence: f64 = typed(field, value, "number in [0, 1]")?;
                if !(0.0..=1.0).contains(&confidence) {
                    return Err(StateError::TypeMismatch {
                        field: field.as_str().to_string(),
                        expected: "number in [0, 1]",
                    });
                }
                next.intent_confidence = confidence;
            }
            StateField::Plan => next.plan = typed(field, value, "array of plan steps")?,
            StateField::RoutingDecision => {
                next.routing_decision = typed(field, value, "string or null")?;
            }
            StateField::PendingTasks => {
                next.pending_tasks = typed(field, value, "array of tasks")?;
            }
            StateField::AgentResults => {
                next.agent_results = typed(field, value, "object")?;
            }
            StateField::ResponseMetadata => {
                next.response_metadata = typed(field, value, "object")?;
            }
            StateField::CompletedNodes => {
                next.completed_nodes = typed(field, value, "array of strings")?;
            }
            StateField::CurrentNode => {
                next.current_node = typed(field, value, "string or null")?;
            }
            StateField::PreviousNode => {
                next.previous_node = typed(field, value, "string or null")?;
            }
            StateField::Status => next.status = typed(field, value, "status label")?,
            StateField::Step => {
                let step: u64 = typed(field, value, "non-negative integer")?;
                if step < state.step {
                    return Err(StateError::InvariantViolated(format!(
                        "step may not decrease ({} -> {})",
                        state.step, step
                    )));
                }
                next.step = step;
            }
            StateField::Hashes => {
                next.hashes = typed::<StateHashes>(field, value, "hashes object")?;
            }
            StateField::HumanGateReason => {
                next.human_gate_reason = typed(field, value, "string or null")?;
            }
            StateField::ResumeToken => {
                next.resume_token = typed(field, value, "string or null")?;
            }
        }
        next.updated_at = chrono::Utc::now();
        Ok(next)
    }

    /// Key-by-key overwrite into a mapping field
    ///
    /// New keys land in insertion order after existing ones; existing keys
    /// are overwritten in place.
    pub fn merge_mapping(
        &self,
        state: &GraphState,
        field: StateField,
        pairs: Map<String, Value>,
    ) -> Result<GraphState, StateError> {
        let mut next = state.clone();
        match field {
            StateField::AgentResults => merge_into(&mut next.agent_results, pairs),
            StateField::ResponseMetadata => merge_into(&mut next.response_metadata, pairs),
            StateField::Hashes => {
                for (key, value) in pairs {
                    let hash: Option<String> =
                        serde_json::from_value(value).map_err(|_| StateError::TypeMismatch {
                            field: format!("hashes.{key}"),
                            expected: "string or null",
                        })?;
                    match key.as_str() {
                        "query_hash" => next.hashes.query_hash = hash,
                        "last_summary_hash" => next.hashes.last_summary_hash = hash,
                        other => {
                            return Err(StateError::InvalidField(format!("hashes.{other}")))
                        }
                    }
                }
            }
            other => {
                return Err(StateError::TypeMismatch {
                    field: other.as_str().to_string(),
                    expected: "mapping field",
                })
            }
        }
        next.updated_at = chrono::Utc::now();
        Ok(next)
    }

    /// Append one element to a sequence field
    pub fn append(
        &self,
        state: &GraphState,
        field: StateField,
        value: Value,
    ) -> Result<GraphState, StateError> {
        let mut next = state.clone();
        match field {
            StateField::CompletedNodes => {
                let node: String = typed(field, value, "string")?;
                next.completed_nodes.push(node);
            }
            StateField::Plan => {
                let step: PlanStep = typed(field, value, "plan step")?;
                next.plan.push(step);
            }
            StateField::PendingTasks => {
                let task: TaskItem = typed(field, value, "task")?;
                next.pending_tasks.push(task);
            }
            other => {
                return Err(StateError::TypeMismatch {
                    field: other.as_str().to_string(),
                    expected: "sequence field",
                })
            }
        }
        next.updated_at = chrono::Utc::now();
        Ok(next)
    }

    /// Move execution to `to_node`
    ///
    /// Shifts `current_node` into `previous_node`, appends the departed node
    /// to `completed_nodes`, and increments `step`.
    pub fn advance(
        &self,
        state: &GraphState,
        to_node: impl Into<String>,
    ) -> Result<GraphState, StateError> {
        let mut next = state.clone();
        if let Some(departed) = next.current_node.take() {
            next.completed_nodes.push(departed.clone());
            next.previous_node = Some(departed);
        }
        next.current_node = Some(to_node.into());
        next.step += 1;
        next.updated_at = chrono::Utc::now();
        Ok(next)
    }
}

fn merge_into(target: &mut Map<String, Value>, pairs: Map<String, Value>) {
    for (key, value) in pairs {
        target.insert(key, value);
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    field: StateField,
    value: Value,
    expected: &'static str,
) -> Result<T, StateError> {
    serde_json::from_value(value).map_err(|_| StateError::TypeMismatch {
        field: field.as_str().to_string(),
        expected,
    })
}
