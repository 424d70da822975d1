pub mod client;
mod database;
pub mod memory;
mod record;

pub use database::{Database, DbError, Result};
