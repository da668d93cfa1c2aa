//! Agent console - client for a remote computer-use agent backend

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod session;
pub mod store;
pub mod vnc;
