pub mod error;
pub mod models;
pub mod queries;
pub mod schema;
pub mod tags;
