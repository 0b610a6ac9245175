pub mod database;
pub mod domain;
