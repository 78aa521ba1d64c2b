pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use messages::MessageStore;
pub use models::*;
