pub mod core;
pub mod db;
pub mod error;
pub mod routes;
