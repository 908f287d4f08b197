//! Form definitions backing the HTTP routes.

pub mod database;
pub mod images;
