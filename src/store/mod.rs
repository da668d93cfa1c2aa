//! State containers read by the presentation layer
//!
//! Each store keeps its own loading flag and latest error. Network and
//! synchronization work goes through the coordinator or the backend.

pub mod messages;
pub mod sessions;
pub mod tasks;
pub mod workspace;

pub use messages::MessagesStore;
pub use sessions::SessionsStore;
pub use tasks::{Task, TaskStatus, TasksStore};
pub use workspace::{RecordingStatus, Workspace, WorkspaceStore};

use crate::api::ApiError;

/// Errors raised by store actions
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No current session")]
    NoSession,

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Loading flag plus latest error, shared by the network-backed stores
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    pub loading: bool,
    pub error: Option<String>,
}

impl StoreStatus {
    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn end<T, E: std::fmt::Display>(&mut self, result: &Result<T, E>) {
        self.loading = false;
        if let Err(e) = result {
            self.error = Some(e.to_string());
        }
    }
}
