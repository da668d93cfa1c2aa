//! Session live updates

pub mod accumulator;
pub mod backend;
pub mod coordinator;

pub use accumulator::{extract_text, parse_frame, Accumulator, StreamFrame};
pub use backend::SessionBackend;
pub use coordinator::{
    Cursor, LiveUpdateCoordinator, SessionSnapshot, UpdatePhase, UpdateSettings, UpdateStrategy,
};
