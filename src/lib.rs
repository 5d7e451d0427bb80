pub mod error;
pub mod text;
pub mod config;
pub mod model;
pub mod ops;
pub mod report;
pub mod cli;
