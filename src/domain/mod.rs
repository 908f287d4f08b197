//! Domain entities exposed by the service layer.

pub mod image;
pub mod types;
