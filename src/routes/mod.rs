pub mod auth;
pub mod invest;
pub mod tx;
pub mod user;
pub mod utils;
pub mod wallet;
