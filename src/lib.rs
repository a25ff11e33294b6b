pub mod cli;
pub mod daemon;
pub mod errors;
pub mod models;
pub mod registry;
pub mod storage;
