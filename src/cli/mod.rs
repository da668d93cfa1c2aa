//! CLI module

pub mod commands;

pub use commands::TranscriptPrinter;

pub fn run() -> anyhow::Result<()> {
    commands::run()
}
