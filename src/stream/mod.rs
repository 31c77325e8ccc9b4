//! Capture-to-client streaming loop

pub mod driver;

pub use driver::{DriverConfig, DriverState, DriverStats, FrameOutcome, StreamDriver};
