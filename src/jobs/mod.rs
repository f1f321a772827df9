// Job status tracking against the remote source of truth

pub mod core;
pub mod poller;

pub use self::core::{PollMode, PollerCore, StatusTransition};
pub use poller::{JobPoller, PollerHandle};
