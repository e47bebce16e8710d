pub mod analysis;
pub mod api;
pub mod data_collector;
pub mod database;
pub mod models;
pub mod tables;
pub mod universe;
pub mod utils;
