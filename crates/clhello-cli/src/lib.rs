//! clhello CLI library
//!
//! This library exposes internal modules for testing purposes.

pub mod app;
pub mod config;
pub mod exit;
pub mod output;
