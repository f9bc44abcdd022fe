//! Core domain types and evaluation logic.

pub mod bar;
pub mod series;
pub mod session;
pub mod setup;
pub mod schema;
pub mod evaluator;
pub mod aggregate;
pub mod environment;
pub mod engine;
pub mod config;
pub mod config_validation;
pub mod error;
