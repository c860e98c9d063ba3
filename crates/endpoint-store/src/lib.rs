mod error;
mod open;
mod models;
mod insert;
mod query;
mod schema;

pub use error::StoreError;
pub use open::Db;
pub use models::*;
