//! # Exintel Common Library
//!
//! Shared code for the exchange-intelligence services including:
//! - Database initialization and entity models
//! - Bootstrap configuration loading
//! - Natural-key normalization (feature slugs, exchange name keys)
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod naming;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
