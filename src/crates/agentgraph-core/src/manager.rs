//! Dynamic graph manager - atomic swap of the active graph
//!
//! The manager owns the compiled `Arc<Graph>` the runtime routes on.
//! Rebuilds compile a new graph from the registry's current descriptors and
//! swap the pointer; in-flight turns keep the `Arc` they took at turn start,
//! so a swap never interrupts a running node. Readers never block on
//! writers: the read path is a pointer clone under a short read lock, the
//! write path serializes on the write lock.

use crate::graph::{Graph, GraphBuildError, GraphSpec, NodeDescriptor};
use crate::registry::{NodeRegistry, RegistryError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from dynamic graph management
#[derive(Debug, Error)]
pub enum GraphManagerError {
    #[error(transparent)]
    Build(#[from] GraphBuildError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("No graph spec installed; call rebuild first")]
    NoSpec,
}

/// Owner of the active graph pointer and its version counter
pub struct GraphManager {
    registry: Arc<NodeRegistry>,
    active: RwLock<Option<Arc<Graph>>>,
    spec: RwLock<Option<GraphSpec>>,
    version: AtomicU64,
}

impl GraphManager {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            active: RwLock::new(None),
            spec: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Compile `spec` against the current registry and swap it in atomically
    ///
    /// Returns the new graph version. In-flight turns continue on the graph
    /// version they pinned at turn start.
    pub fn rebuild(&self, spec: GraphSpec) -> Result<u64, GraphManagerError> {
        // Serialize writers on the spec lock for the whole compile+swap
        let mut spec_slot = self.spec.write();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let graph = spec.compile(self.registry.snapshot(), version)?;
        *self.active.write() = Some(Arc::new(graph));
        *spec_slot = Some(spec);
        tracing::info!(version, "graph rebuilt");
        Ok(version)
    }

    /// Recompile the installed spec (after registry changes)
    pub fn refresh(&self) -> Result<u64, GraphManagerError> {
        let spec = self
            .spec
            .read()
            .clone()
            .ok_or(GraphManagerError::NoSpec)?;
        self.rebuild(spec)
    }

    /// Snapshot of the active graph for a turn
    pub fn current(&self) -> Result<Arc<Graph>, GraphManagerError> {
        self.active
            .read()
            .clone()
            .ok_or(GraphManagerError::NoSpec)
    }

    /// Register (or replace) a node and recompile so new turns see it
    pub fn register_node(
        &self,
        descriptor: NodeDescriptor,
        caller: crate::graph::Privilege,
    ) -> Result<u64, GraphManagerError> {
        self.registry.register(descriptor, caller)?;
        self.refresh()
    }

    /// Unregister a node
    ///
    /// Fails with `InUse` when the active graph references the node and no
    /// replacement is supplied; with a replacement the swap is atomic: the
    /// replacement is registered under the same name, then the graph is
    /// recompiled.
    pub fn unregister_node(
        &self,
        name: &str,
        replacement: Option<NodeDescriptor>,
        caller: crate::graph::Privilege,
    ) -> Result<(), GraphManagerError> {
        let in_use = self
            .active
            .read()
            .as_ref()
            .is_some_and(|g| g.contains(name));

        match replacement {
            None => {
                if in_use {
                    return Err(RegistryError::InUse(name.to_string()).into());
                }
                self.registry.remove(name)?;
                Ok(())
            }
            Some(mut replacement) => {
                replacement.name = name.to_string();
                self.registry.register(replacement, caller)?;
                if in_use {
                    self.refresh()?;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for GraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphManager")
            .field("version", &self.version.load(Ordering::SeqCst))
            .field("nodes", &self.registry.len())
            .finish()
    }
}
