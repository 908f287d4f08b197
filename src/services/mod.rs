pub mod database;
pub mod errors;
pub mod images;
pub mod startup;

pub use errors::{ServiceError, ServiceResult};
