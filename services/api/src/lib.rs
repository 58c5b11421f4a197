//! services/api/src/lib.rs
//!
//! The Ex-It API service: adapters, configuration and the web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
