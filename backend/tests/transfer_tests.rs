//! Location to location transfer tests

mod common;

use rust_decimal::Decimal;

use common::{dec, fixture};
use inventory_costing::error::AppError;
use shared::{PendingStatus, StockKey};

#[tokio::test]
async fn test_transfer_keeps_layer_costs() {
    let f = fixture().await;
    f.receive("30", "5.00").await;
    f.receive("20", "6.00").await;

    let result = f.service.transfer(f.transfer_request("50")).await.unwrap();

    assert_eq!(result.quantity_transferred, dec("50"));
    assert_eq!(result.total_cost, dec("270.00"));
    assert!(result.shortage.is_none());
    assert_eq!(result.destination_layers.len(), 2);
    assert_eq!(result.destination_layers[0].quantity_received, dec("30"));
    assert_eq!(result.destination_layers[0].unit_cost, dec("5.00"));
    assert_eq!(result.destination_layers[1].quantity_received, dec("20"));
    assert_eq!(result.destination_layers[1].unit_cost, dec("6.00"));
    assert!(result
        .destination_layers
        .iter()
        .all(|l| l.location_id == f.other_location));

    assert_eq!(result.from_movements.len(), 2);
    assert!(result
        .from_movements
        .iter()
        .all(|m| m.quantity < Decimal::ZERO && m.from_location_id == Some(f.location)));
    assert_eq!(result.to_movements.len(), 2);
    for movement in &result.to_movements {
        assert_eq!(movement.from_location_id, Some(f.location));
        assert_eq!(movement.to_location_id, Some(f.other_location));
        assert!(movement.quantity > Decimal::ZERO);
    }
    assert_eq!(
        result.to_movements[0].note,
        format!("Transfer from location {} @ $5/unit", f.location)
    );

    let source = f
        .service
        .available_quantity(StockKey::location_wide(f.item, f.location))
        .await
        .unwrap();
    let destination = f
        .service
        .valuation(StockKey::location_wide(f.item, f.other_location))
        .await
        .unwrap();
    assert_eq!(source, Decimal::ZERO);
    assert_eq!(destination.quantity_on_hand, dec("50"));
    assert_eq!(destination.total_value, dec("270.00"));
}

#[tokio::test]
async fn test_transfer_shortfall_backorders_at_source() {
    let f = fixture().await;
    f.receive("30", "5.00").await;

    let result = f.service.transfer(f.transfer_request("50")).await.unwrap();

    assert_eq!(result.quantity_transferred, dec("30"));
    let shortage = result.shortage.unwrap();
    assert_eq!(shortage.quantity, dec("20"));
    assert_eq!(shortage.pending_allocation.location_id, f.location);
    assert_eq!(result.destination_layers.len(), 1);
    assert_eq!(result.destination_layers[0].quantity_received, dec("30"));
}

#[tokio::test]
async fn test_transfer_fulfils_destination_backorders() {
    let f = fixture().await;
    let mut request = f.allocate_request("10");
    request.location_id = f.other_location;
    let pending_id = f
        .service
        .allocate(request)
        .await
        .unwrap()
        .shortage
        .unwrap()
        .pending_allocation
        .id;
    f.receive("30", "4.00").await;

    let result = f.service.transfer(f.transfer_request("30")).await.unwrap();

    assert_eq!(result.reconciliation.fulfilled, vec![pending_id]);
    let pending = f.backend().pending().await;
    assert_eq!(pending[0].status, PendingStatus::Fulfilled);
    assert_eq!(pending[0].actual_cost_to_date, dec("40.00"));

    let destination = f
        .service
        .available_quantity(StockKey::location_wide(f.item, f.other_location))
        .await
        .unwrap();
    assert_eq!(destination, dec("20"));
}

#[tokio::test]
async fn test_transfer_between_bins_in_one_location() {
    let f = fixture().await;
    let mut receipt = f.receive_request("10", "2.00");
    receipt.bin_id = Some(f.bin_a);
    f.service.receive(receipt).await.unwrap();

    let mut request = f.transfer_request("4");
    request.to_location_id = f.location;
    request.from_bin_id = Some(f.bin_a);
    request.to_bin_id = Some(f.bin_b);
    let result = f.service.transfer(request).await.unwrap();

    assert_eq!(result.destination_layers[0].bin_id, Some(f.bin_b));
    let in_b = f
        .service
        .available_quantity(StockKey::new(f.item, f.location, Some(f.bin_b)))
        .await
        .unwrap();
    let in_a = f
        .service
        .available_quantity(StockKey::new(f.item, f.location, Some(f.bin_a)))
        .await
        .unwrap();
    assert_eq!(in_b, dec("4"));
    assert_eq!(in_a, dec("6"));
}

#[tokio::test]
async fn test_bin_transfer_shortfall_is_not_filled_by_its_own_stock() {
    let f = fixture().await;
    let mut receipt = f.receive_request("30", "2.00");
    receipt.bin_id = Some(f.bin_a);
    f.service.receive(receipt).await.unwrap();

    let mut request = f.transfer_request("50");
    request.to_location_id = f.location;
    request.from_bin_id = Some(f.bin_a);
    request.to_bin_id = Some(f.bin_b);
    let result = f.service.transfer(request).await.unwrap();

    assert_eq!(result.quantity_transferred, dec("30"));
    assert_eq!(result.shortage.as_ref().unwrap().quantity, dec("20"));
    assert!(result.reconciliation.is_noop());

    let in_b = f
        .service
        .available_quantity(StockKey::new(f.item, f.location, Some(f.bin_b)))
        .await
        .unwrap();
    assert_eq!(in_b, dec("30"));

    let pending = f.backend().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, PendingStatus::AwaitingReceipt);
    assert_eq!(pending[0].quantity_fulfilled, Decimal::ZERO);
}

#[tokio::test]
async fn test_location_wide_source_within_one_location_is_rejected() {
    let f = fixture().await;
    let mut receipt = f.receive_request("10", "1.00");
    receipt.bin_id = Some(f.bin_b);
    f.service.receive(receipt).await.unwrap();

    let mut request = f.transfer_request("5");
    request.to_location_id = f.location;
    request.to_bin_id = Some(f.bin_b);
    let err = f.service.transfer(request).await.unwrap_err();

    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "to_location_id"));
    assert_eq!(f.backend().layers().await.len(), 1);
    assert_eq!(f.backend().movements().await.len(), 1);
}

#[tokio::test]
async fn test_transfer_to_same_place_is_rejected() {
    let f = fixture().await;
    f.receive("10", "1.00").await;
    let mut request = f.transfer_request("5");
    request.to_location_id = f.location;

    let err = f.service.transfer(request).await.unwrap_err();

    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "to_location_id"));
    assert_eq!(f.backend().movements().await.len(), 1);
}

#[tokio::test]
async fn test_transfer_to_bin_outside_destination_is_rejected() {
    let f = fixture().await;
    f.receive("10", "1.00").await;
    let mut request = f.transfer_request("5");
    request.to_bin_id = Some(f.bin_a);

    let err = f.service.transfer(request).await.unwrap_err();

    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "bin_id"));
    assert_eq!(f.backend().layers().await.len(), 1);
}
