//! Core types and utilities for plankton autoencoder training.
//!
//! This crate provides the configuration model, error type, device
//! selection and CLI helpers shared by the dataset and training crates.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use backend::*;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;
