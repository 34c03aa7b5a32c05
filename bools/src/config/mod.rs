//! Environment configuration and dependency wiring.

mod dependencies;

pub use dependencies::{Dependencies, Settings};
