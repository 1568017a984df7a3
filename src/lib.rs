// Library surface for the binary, headless integration tests and reuse.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod cues;
pub mod logging;
pub mod plan;
pub mod recording;
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod ui;
pub mod workout;
