//! Domain models for the FIFO inventory costing service

mod allocation;
mod cost_layer;
mod movement;
mod pending;

pub use allocation::*;
pub use cost_layer::*;
pub use movement::*;
pub use pending::*;
