//! Scaffold nodes the runtime contract depends on
//!
//! Intent, reasoning, supervisor, router, assemble, and the standalone human
//! gate. These are system nodes: deterministic, side-effect free, and cheap.
//! Capability-bearing agents live in [`crate::agents`].

pub mod assemble;
pub mod human_gate;
pub mod intent;
pub mod reasoning;
pub mod router;
pub mod supervisor;

pub use assemble::AssembleNode;
pub use human_gate::HumanGateNode;
pub use intent::IntentNode;
pub use reasoning::{agent_for_intent, ReasoningNode};
pub use router::RouterNode;
pub use supervisor::{SupervisorNode, NODE_CATALOG};
