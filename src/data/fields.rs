//! Canonical quantity-key names and the graph/node field registry.
//!
//! Quantity keys identify the physical outputs flowing through a prediction
//! pipeline. The registry below distinguishes *graph-level* fields (one value
//! per graph in a batch) from *node-level* fields (one value per atom); this
//! distinction is load-bearing for per-atom loss validation.

/// Total potential energy of a graph. Graph-level, extensive.
pub const TOTAL_ENERGY: &str = "total_energy";

/// Per-atom decomposition of the total energy. Node-level.
pub const PER_ATOM_ENERGY: &str = "atomic_energy";

/// Forces on each atom. Node-level, `[n_atoms, 3]`.
pub const FORCE: &str = "forces";

/// Virial stress of a graph. Graph-level.
pub const STRESS: &str = "stress";

/// Species (atom-type) label of each atom. Node-level, I64.
pub const ATOM_TYPE: &str = "atom_types";

/// Index of the graph each atom belongs to. Node-level, I64.
pub const BATCH: &str = "batch";

/// Fields carrying one value per graph.
pub const GRAPH_FIELDS: &[&str] = &[TOTAL_ENERGY, STRESS];

/// Fields carrying one value per atom.
pub const NODE_FIELDS: &[&str] = &[PER_ATOM_ENERGY, FORCE, ATOM_TYPE, BATCH];

/// Whether `name` is registered as a graph-level field.
pub fn is_graph_field(name: &str) -> bool {
    GRAPH_FIELDS.contains(&name)
}

/// Whether `name` is registered as a node-level field.
pub fn is_node_field(name: &str) -> bool {
    NODE_FIELDS.contains(&name)
}
