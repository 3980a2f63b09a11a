//! Core domain models for the engine
//!
//! This module defines pipelines, steps, execution records and the shared
//! registries the engine reads from.

pub mod catalog;
pub mod config;
pub mod error;
pub mod patterns;
pub mod pipeline;
pub mod state;
pub mod step;

pub use catalog::*;
pub use error::*;
pub use patterns::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
