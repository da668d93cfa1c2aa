//! Remote desktop of the agent sandbox

pub mod controller;
pub mod events;

pub use controller::{
    ConnectionState, ConnectionStatus, RemoteDesktop, RemoteDesktopApi, RemoteDesktopError,
    RemoteDesktopEvent, RemoteDesktopSettings, ViewerOptions,
};
pub use events::{EventEmitter, ListenerId};
