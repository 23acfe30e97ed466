//! Graph-level configuration.

use crate::env;

/// Default number of deferred shapes each graph remembers before LRU eviction.
pub const DEFAULT_SHAPE_CACHE_CAPACITY: usize = 4096;

/// Tunables for a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Capacity of the per-graph shape cache; `0` disables it.
    pub shape_cache_capacity: usize,
    /// Emit a `tracing` debug event for every node inserted into the graph.
    pub log_graph_changes: bool,
}

impl GraphConfig {
    /// Reads `LAZY_IR_SHAPE_CACHE_SIZE` and `LAZY_IR_LOG_GRAPH_CHANGES`, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            shape_cache_capacity: env::shape_cache_size().unwrap_or(DEFAULT_SHAPE_CACHE_CAPACITY),
            log_graph_changes: env::log_graph_changes(),
        }
    }

    pub fn with_shape_cache_capacity(mut self, capacity: usize) -> Self {
        self.shape_cache_capacity = capacity;
        self
    }

    pub fn with_log_graph_changes(mut self, enabled: bool) -> Self {
        self.log_graph_changes = enabled;
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            shape_cache_capacity: DEFAULT_SHAPE_CACHE_CAPACITY,
            log_graph_changes: false,
        }
    }
}
