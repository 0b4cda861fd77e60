pub mod config;
pub mod error;
pub mod manifest;

pub use error::{SbxError, SbxResult};
pub use manifest::Manifest;
