//! Node registry - the living catalog of invocable nodes
//!
//! The registry owns descriptors by name, independent of any compiled graph.
//! Registration is privilege-checked: placing a node that requires
//! `Elevated` or above needs a caller at or above that tier. The `enabled`
//! flag is live - the execution loop consults the registry at resolve time,
//! so toggling a node affects in-flight turns without a graph rebuild
//! (topology stays pinned; visibility does not).

use crate::graph::{NodeDescriptor, Privilege};
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Caller privilege too low for the node being registered
    #[error(
        "Privilege conflict registering '{node}': requires {required}, caller is {caller}",
        required = required.as_str(),
        caller = caller.as_str()
    )]
    PrivilegeConflict {
        node: String,
        required: Privilege,
        caller: Privilege,
    },

    /// The active graph still references this node
    #[error("Node '{0}' is referenced by the active graph")]
    InUse(String),

    /// No node registered under this name
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

/// Thread-safe name -> descriptor catalog
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<String, NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor under its name
    ///
    /// Registering a node that requires `Elevated` privilege or above needs
    /// a caller at or above that tier; `Standard` and below register freely.
    pub fn register(
        &self,
        descriptor: NodeDescriptor,
        caller: Privilege,
    ) -> Result<(), RegistryError> {
        if descriptor.required_privilege >= Privilege::Elevated
            && caller < descriptor.required_privilege
        {
            return Err(RegistryError::PrivilegeConflict {
                node: descriptor.name.clone(),
                required: descriptor.required_privilege,
                caller,
            });
        }
        tracing::debug!(node = %descriptor.name, "registered node");
        self.nodes.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Remove a descriptor. The in-use check against the active graph is the
    /// graph manager's job; this is the raw removal.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.nodes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownNode(name.to_string()))
    }

    /// Runtime toggle; disabled nodes are treated as absent by routing
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut entry = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownNode(name.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Live enabled flag; unknown nodes read as disabled
    pub fn is_enabled(&self, name: &str) -> bool {
        self.nodes.get(name).map(|d| d.enabled).unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<NodeDescriptor> {
        self.nodes.get(name).map(|d| d.clone())
    }

    /// Clone of the full catalog, for graph compilation
    pub fn snapshot(&self) -> HashMap<String, NodeDescriptor> {
        self.nodes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
