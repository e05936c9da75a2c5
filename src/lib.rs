pub mod catalog;
pub mod clock;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod model;
pub mod selector;
pub mod source;
pub mod state;
pub mod token;
pub mod tasks {
    pub mod rotation;
}

pub use error::{ErrorKind, FrameError};
