//! HTTP request handlers

pub mod health;
pub mod inventory;

pub use health::*;
pub use inventory::*;
