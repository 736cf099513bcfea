//! FIFO allocation tests
//!
//! Covers consumption order, backorders, refusal without negative inventory,
//! bin filtering and the read-side queries.

mod common;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{dec, fixture};
use inventory_costing::error::AppError;
use inventory_costing::services::EstimateCostRequest;
use shared::{PendingStatus, StockKey};

// ============================================================================
// Unit Tests
// ============================================================================

mod unit_tests {
    use super::*;

    #[tokio::test]
    async fn test_allocation_spans_layers_oldest_first() {
        let f = fixture().await;
        let a = f.receive("100", "5.00").await.layer;
        let b = f.receive("50", "6.00").await.layer;

        let result = f.allocate("120").await;

        assert!(result.shortage.is_none());
        assert_eq!(result.allocated_quantity, dec("120"));
        assert_eq!(result.total_cost, dec("620.00"));
        assert_eq!(result.allocations.len(), 2);
        assert_eq!(result.allocations[0].layer_id, a.id);
        assert_eq!(result.allocations[0].quantity, dec("100"));
        assert_eq!(result.allocations[0].total_cost, dec("500.00"));
        assert_eq!(result.allocations[1].layer_id, b.id);
        assert_eq!(result.allocations[1].quantity, dec("20"));
        assert_eq!(result.allocations[1].total_cost, dec("120.00"));

        let layers = f.backend().layers().await;
        assert_eq!(layers[0].quantity_remaining, Decimal::ZERO);
        assert_eq!(layers[1].quantity_remaining, dec("30"));
    }

    #[tokio::test]
    async fn test_consumption_rows_are_negative_and_linked() {
        let f = fixture().await;
        let a = f.receive("10", "2.50").await.layer;

        let mut request = f.allocate_request("4");
        request.work_order_id = Some(f.work_order);
        request.reference = Some("WO-42".to_string());
        let result = f.service.allocate(request).await.unwrap();

        assert_eq!(result.movements.len(), 1);
        let row = &result.movements[0];
        assert_eq!(row.quantity, dec("-4"));
        assert_eq!(row.unit_cost, dec("2.50"));
        assert_eq!(row.total_cost, dec("10.00"));
        assert_eq!(row.layer_id, Some(a.id));
        assert_eq!(row.from_location_id, Some(f.location));
        assert_eq!(row.work_order_id, Some(f.work_order));
        assert_eq!(row.reference, "WO-42");
        assert_eq!(row.note, format!("FIFO allocation from layer {}", a.id));
        assert!(!row.is_estimated);
    }

    #[tokio::test]
    async fn test_backorder_creates_pending_and_estimate() {
        let f = fixture().await;
        f.receive("100", "5.00").await;
        f.receive("50", "6.00").await;
        f.allocate("120").await;

        let result = f.allocate("50").await;

        let shortage = result.shortage.as_ref().unwrap();
        assert_eq!(result.drawn_quantity(), dec("30"));
        assert_eq!(result.drawn_cost(), dec("180.00"));
        assert_eq!(shortage.quantity, dec("20"));
        assert_eq!(shortage.estimated_unit_cost, dec("6.00"));
        assert_eq!(shortage.estimated_total_cost, dec("120.00"));
        assert_eq!(result.total_cost, dec("300.00"));
        assert_eq!(
            result.warning(),
            Some("Insufficient inventory. Allocated 30, pending 20 units.")
        );

        let pending = &shortage.pending_allocation;
        assert_eq!(pending.quantity, dec("20"));
        assert_eq!(pending.status, PendingStatus::AwaitingReceipt);
        assert_eq!(pending.estimated_movement_id, Some(shortage.estimated_movement.id));

        let estimated: Vec<_> = f
            .backend()
            .movements()
            .await
            .into_iter()
            .filter(|m| m.is_estimated)
            .collect();
        assert_eq!(estimated.len(), 1);
        assert_eq!(estimated[0].quantity, dec("-20"));
        assert_eq!(
            estimated[0].note,
            format!("ESTIMATED - Pending fulfillment: {}", pending.id)
        );
        assert_eq!(f.backend().pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refusal_leaves_state_untouched() {
        let f = fixture().await;
        f.receive("30", "6.00").await;
        let layers_before = f.backend().layers().await;
        let movements_before = f.backend().movements().await.len();

        let mut request = f.allocate_request("50");
        request.allow_negative = Some(false);
        let err = f.service.allocate(request).await.unwrap_err();

        match err {
            AppError::InsufficientInventory {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, dec("50"));
                assert_eq!(available, dec("30"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(f.backend().layers().await, layers_before);
        assert_eq!(f.backend().movements().await.len(), movements_before);
        assert!(f.backend().pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_equal_received_at_uses_creation_order() {
        let f = fixture().await;
        let at = Utc.with_ymd_and_hms(2025, 1, 22, 10, 0, 0).unwrap();
        let first = f.receive_at(f.location, "10", "1.00", Some(at)).await.layer;
        let second = f.receive_at(f.location, "10", "2.00", Some(at)).await.layer;
        assert!(first.sequence < second.sequence);

        let result = f.allocate("5").await;

        assert_eq!(result.allocations.len(), 1);
        assert_eq!(result.allocations[0].layer_id, first.id);
    }

    #[tokio::test]
    async fn test_backdated_receipt_is_consumed_first() {
        let f = fixture().await;
        let now = Utc::now();
        let later = f.receive_at(f.location, "10", "3.00", Some(now)).await.layer;
        let earlier = f
            .receive_at(f.location, "10", "1.00", Some(now - Duration::days(2)))
            .await
            .layer;

        let result = f.allocate("12").await;

        assert_eq!(result.allocations[0].layer_id, earlier.id);
        assert_eq!(result.allocations[1].layer_id, later.id);
        assert_eq!(result.total_cost, dec("16.00"));
    }

    #[tokio::test]
    async fn test_bin_filter_limits_layers() {
        let f = fixture().await;
        let now = Utc::now();

        let mut in_b = f.receive_request("10", "2.00");
        in_b.bin_id = Some(f.bin_b);
        in_b.received_at = Some(now - Duration::hours(1));
        f.service.receive(in_b).await.unwrap();

        let mut in_a = f.receive_request("10", "1.00");
        in_a.bin_id = Some(f.bin_a);
        let a_layer = f.service.receive(in_a).await.unwrap().layer;

        let mut request = f.allocate_request("4");
        request.bin_id = Some(f.bin_a);
        let result = f.service.allocate(request).await.unwrap();

        assert_eq!(result.allocations[0].layer_id, a_layer.id);
        assert_eq!(result.movements[0].from_bin_id, Some(f.bin_a));

        let in_bin_a = f
            .service
            .available_quantity(StockKey::new(f.item, f.location, Some(f.bin_a)))
            .await
            .unwrap();
        let everywhere = f
            .service
            .available_quantity(StockKey::location_wide(f.item, f.location))
            .await
            .unwrap();
        assert_eq!(in_bin_a, dec("6"));
        assert_eq!(everywhere, dec("16"));
    }

    #[tokio::test]
    async fn test_bin_from_another_location_is_rejected() {
        let f = fixture().await;
        let mut request = f.allocate_request("1");
        request.bin_id = Some(f.foreign_bin);

        let err = f.service.allocate(request).await.unwrap_err();

        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "bin_id"));
    }

    #[tokio::test]
    async fn test_invalid_quantities_are_rejected() {
        let f = fixture().await;

        for quantity in ["0", "-5", "1.00001", "100000000000000"] {
            let err = f.service.allocate(f.allocate_request(quantity)).await.unwrap_err();
            assert!(
                matches!(err, AppError::Validation { ref field, .. } if field == "quantity"),
                "quantity {} should be rejected",
                quantity
            );
        }

        let err = f
            .service
            .receive(f.receive_request("10", "-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "unit_cost"));
    }

    #[tokio::test]
    async fn test_oversized_demand_is_rejected_not_priced() {
        let f = fixture().await;
        f.receive("10", "6.00").await;
        let movements_before = f.backend().movements().await.len();

        let err = f
            .service
            .allocate(f.allocate_request("50000000000000000000000000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));

        let err = f
            .service
            .estimate_cost(EstimateCostRequest {
                item_id: f.item,
                location_id: f.location,
                quantity: dec("50000000000000000000000000000"),
                bin_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));

        let err = f
            .service
            .receive(f.receive_request("1", "100000000000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "unit_cost"));

        assert_eq!(f.backend().movements().await.len(), movements_before);
        assert!(f.backend().pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let f = fixture().await;

        let mut request = f.allocate_request("1");
        request.item_id = Uuid::new_v4();
        let err = f.service.allocate(request).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref what) if what == "Item"));

        let mut request = f.allocate_request("1");
        request.order_id = Some(Uuid::new_v4());
        let err = f.service.allocate(request).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref what) if what == "Order"));
    }

    #[tokio::test]
    async fn test_shortage_estimate_fallbacks() {
        let f = fixture().await;

        // Nothing known about the item: zero
        let result = f.allocate("5").await;
        assert_eq!(result.shortage.as_ref().unwrap().estimated_unit_cost, Decimal::ZERO);

        // Replacement cost wins when set
        f.service
            .costs()
            .set_replacement_cost(f.item, dec("9.50"))
            .await;
        let result = f.allocate("2").await;
        assert_eq!(
            result.shortage.as_ref().unwrap().estimated_unit_cost,
            dec("9.50")
        );
    }

    #[tokio::test]
    async fn test_zero_replacement_cost_falls_back_to_latest_layer() {
        let f = fixture().await;
        f.receive("5", "4.00").await;
        f.receive("5", "4.40").await;
        f.service
            .costs()
            .set_replacement_cost(f.item, Decimal::ZERO)
            .await;

        let result = f.allocate("12").await;

        let shortage = result.shortage.unwrap();
        assert_eq!(shortage.estimated_unit_cost, dec("4.40"));
        assert_eq!(shortage.estimated_total_cost, dec("8.80"));
    }

    #[tokio::test]
    async fn test_receipt_updates_replacement_cost() {
        let f = fixture().await;
        f.receive("5", "4.25").await;

        let cost = f.service.costs().replacement_cost(f.item).await;
        assert_eq!(cost, Some(dec("4.25")));
    }
}

// ============================================================================
// Read-side queries
// ============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_estimate_cost_does_not_write() {
        let f = fixture().await;
        f.receive("30", "6.00").await;
        let movements_before = f.backend().movements().await.len();

        let estimate = f
            .service
            .estimate_cost(EstimateCostRequest {
                item_id: f.item,
                location_id: f.location,
                quantity: dec("50"),
                bin_id: None,
            })
            .await
            .unwrap();

        assert!(!estimate.sufficient);
        assert_eq!(estimate.available_quantity, dec("30"));
        assert_eq!(estimate.shortage, dec("20"));
        assert_eq!(estimate.shortage_estimated_cost, dec("120.00"));
        assert_eq!(estimate.estimated_cost, dec("300.00"));
        assert_eq!(f.backend().movements().await.len(), movements_before);
        assert_eq!(f.backend().layers().await[0].quantity_remaining, dec("30"));
        assert!(f.backend().pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_layer_breakdown_skips_depleted_layers() {
        let f = fixture().await;
        f.receive("10", "1.00").await;
        let b = f.receive("10", "2.00").await.layer;
        f.allocate("10").await;

        let layers = f
            .service
            .layer_breakdown(StockKey::location_wide(f.item, f.location))
            .await
            .unwrap();

        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].layer_id, b.id);
        assert_eq!(layers[0].total_value, dec("20.00"));
    }

    #[tokio::test]
    async fn test_valuation() {
        let f = fixture().await;
        f.receive("100", "5.00").await;
        f.receive("50", "6.00").await;

        let valuation = f
            .service
            .valuation(StockKey::location_wide(f.item, f.location))
            .await
            .unwrap();

        assert_eq!(valuation.quantity_on_hand, dec("150"));
        assert_eq!(valuation.total_value, dec("800.00"));
        assert_eq!(valuation.average_unit_cost, dec("5.333333"));
        assert_eq!(valuation.layer_count, 2);
    }

    #[tokio::test]
    async fn test_receipt_row_and_provenance() {
        let f = fixture().await;
        let mut request = f.receive_request("12", "3.10");
        request.source_order_id = Some(f.order);
        request.manufacturer = Some("Acme".to_string());
        request.reference = Some("PO-7".to_string());

        let receipt = f.service.receive(request).await.unwrap();

        assert_eq!(receipt.layer.quantity_remaining, dec("12"));
        assert_eq!(receipt.layer.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(receipt.movement.quantity, dec("12"));
        assert_eq!(receipt.movement.total_cost, dec("37.20"));
        assert_eq!(receipt.movement.to_location_id, Some(f.location));
        assert_eq!(receipt.movement.order_id, Some(f.order));
        assert_eq!(receipt.movement.layer_id, Some(receipt.layer.id));
        assert_eq!(receipt.movement.note, "Received into inventory @ $3.1/unit");
        assert!(receipt.reconciliation.is_noop());
    }

    #[tokio::test]
    async fn test_receipts_never_merge() {
        let f = fixture().await;
        f.receive("10", "5.00").await;
        f.receive("10", "5.00").await;

        assert_eq!(f.backend().layers().await.len(), 2);
    }
}
