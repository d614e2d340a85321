pub mod config;
pub mod replay;
