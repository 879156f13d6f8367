pub mod builder;
pub mod defaults;
pub mod file;
pub mod models;
