//! Shared types for the NHI agent: error, configuration, identity inventory
//! and chat messages.

pub mod config;
pub mod error;
pub mod identity;
pub mod message;

pub use error::{Error, Result};
