//! Shared fixture for the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use inventory_costing::config::CostingConfig;
use inventory_costing::services::{
    AllocateRequest, InventoryService, ReceiveRequest, TransferRequest,
};
use inventory_costing::store::{MemoryBackend, MemoryCostIndex};
use shared::{AllocationResult, ReceiptResult, ReferenceKind};

pub type TestService = InventoryService<MemoryBackend, MemoryCostIndex>;

// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub struct Fixture {
    pub service: TestService,
    pub item: Uuid,
    pub location: Uuid,
    pub other_location: Uuid,
    pub bin_a: Uuid,
    pub bin_b: Uuid,
    pub foreign_bin: Uuid,
    pub work_order: Uuid,
    pub order: Uuid,
}

pub async fn fixture() -> Fixture {
    fixture_with(CostingConfig::default()).await
}

pub async fn fixture_with(config: CostingConfig) -> Fixture {
    let backend = MemoryBackend::new();

    let item = Uuid::new_v4();
    let location = Uuid::new_v4();
    let other_location = Uuid::new_v4();
    let bin_a = Uuid::new_v4();
    let bin_b = Uuid::new_v4();
    let foreign_bin = Uuid::new_v4();
    let work_order = Uuid::new_v4();
    let order = Uuid::new_v4();

    backend.register(ReferenceKind::Item, item).await;
    backend.register(ReferenceKind::Location, location).await;
    backend.register(ReferenceKind::Location, other_location).await;
    backend.register_bin(bin_a, location).await;
    backend.register_bin(bin_b, location).await;
    backend.register_bin(foreign_bin, other_location).await;
    backend.register(ReferenceKind::WorkOrder, work_order).await;
    backend.register(ReferenceKind::Order, order).await;

    let costs = backend.cost_index();
    let service = InventoryService::new(backend, costs, &config);

    Fixture {
        service,
        item,
        location,
        other_location,
        bin_a,
        bin_b,
        foreign_bin,
        work_order,
        order,
    }
}

impl Fixture {
    pub fn backend(&self) -> &MemoryBackend {
        self.service.backend()
    }

    pub fn receive_request(&self, quantity: &str, unit_cost: &str) -> ReceiveRequest {
        ReceiveRequest::new(self.item, self.location, dec(quantity), dec(unit_cost))
    }

    pub async fn receive(&self, quantity: &str, unit_cost: &str) -> ReceiptResult {
        self.service
            .receive(self.receive_request(quantity, unit_cost))
            .await
            .unwrap()
    }

    pub async fn receive_at(
        &self,
        location: Uuid,
        quantity: &str,
        unit_cost: &str,
        received_at: Option<DateTime<Utc>>,
    ) -> ReceiptResult {
        let mut request = ReceiveRequest::new(self.item, location, dec(quantity), dec(unit_cost));
        request.received_at = received_at;
        self.service.receive(request).await.unwrap()
    }

    pub fn allocate_request(&self, quantity: &str) -> AllocateRequest {
        AllocateRequest::new(self.item, self.location, dec(quantity))
    }

    pub async fn allocate(&self, quantity: &str) -> AllocationResult {
        self.service
            .allocate(self.allocate_request(quantity))
            .await
            .unwrap()
    }

    pub fn transfer_request(&self, quantity: &str) -> TransferRequest {
        TransferRequest::new(self.item, self.location, self.other_location, dec(quantity))
    }
}
