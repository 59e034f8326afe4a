pub mod blob;
pub mod config;
pub mod extractor;
pub mod frame;
pub mod pose;
pub mod tracker;
pub mod velocity;

// Re-export main types
pub use crate::config::{ColorRange, Config, ConfigError};
pub use crate::frame::{Frame, Mask};
pub use crate::pose::PoseEstimate;
pub use crate::tracker::{Strategy, Tracker};
