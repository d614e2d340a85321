pub mod models;
pub mod parse;
