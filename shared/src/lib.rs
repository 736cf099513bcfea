//! Shared types and models for the FIFO inventory costing service
//!
//! This crate contains the domain records and the pure FIFO planning logic
//! shared between the backend and the client-side cost preview (via WASM).

pub mod fifo;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
