// Insightflow - workflow core for a guided dataset-to-model analysis workspace

pub mod config;
pub mod gateway;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod types;
pub mod utils;
pub mod workflow;
pub mod workspace;

// Re-exports for convenience
pub use config::Config;
pub use gateway::{HttpGateway, RemoteGateway};
pub use jobs::{JobPoller, PollMode, PollerHandle};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use types::{AppError, AppResult, ErrorKind};
pub use workflow::{Stage, WorkflowStore, WorkspaceState};
pub use workspace::Workspace;
