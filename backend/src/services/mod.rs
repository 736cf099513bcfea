//! Business logic services for FIFO inventory costing

pub mod allocation;
pub mod inventory;
pub mod layers;
pub mod ledger;
pub mod reconciliation;
pub mod references;
pub mod transfer;

pub use allocation::{AllocateRequest, EstimateCostRequest};
pub use inventory::{InventoryService, PgInventoryService};
pub use layers::ReceiveRequest;
pub use reconciliation::{CanceledAllocation, ReconciliationPolicy};
pub use transfer::TransferRequest;
