pub mod database;
pub mod document;
pub mod project;
pub mod schema;
