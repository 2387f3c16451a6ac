pub mod config;
pub mod error;
pub mod inputs;
pub mod output;

pub use config::{ImageGenConfig, ImageGenResult, Moderation, Quality};
pub use error::{ImageGenError, Result};
