// Workspace state, stage gating and the store that mutates them

pub mod compare;
pub mod gate;
pub mod state;
pub mod store;

pub use compare::ComparisonCache;
pub use gate::{reachable, StageAvailability};
pub use state::{Stage, WorkspaceState};
pub use store::WorkflowStore;
