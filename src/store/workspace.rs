//! Local workspace selection and recording state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    #[default]
    Idle,
    Recording,
}

#[derive(Debug, Default)]
pub struct WorkspaceStore {
    workspaces: Vec<Workspace>,
    current: Option<u64>,
    recording: RecordingStatus,
}

impl WorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn set_workspaces(&mut self, workspaces: Vec<Workspace>) {
        if let Some(id) = self.current {
            if !workspaces.iter().any(|w| w.id == id) {
                self.current = None;
            }
        }
        self.workspaces = workspaces;
    }

    /// Select a workspace; unknown ids are ignored
    pub fn set_current_workspace(&mut self, id: Option<u64>) -> bool {
        match id {
            Some(id) if !self.workspaces.iter().any(|w| w.id == id) => false,
            _ => {
                self.current = id;
                true
            }
        }
    }

    pub fn current_workspace(&self) -> Option<&Workspace> {
        let id = self.current?;
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.recording
    }

    pub fn is_recording(&self) -> bool {
        self.recording == RecordingStatus::Recording
    }

    /// Returns `false` if already recording
    pub fn start_recording(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        self.recording = RecordingStatus::Recording;
        info!("Recording started");
        true
    }

    /// Returns `false` if not recording
    pub fn stop_recording(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.recording = RecordingStatus::Idle;
        info!("Recording stopped");
        true
    }
}
