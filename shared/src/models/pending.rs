//! Pending allocation (backorder) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fulfilment state of a pending allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingStatus {
    AwaitingReceipt,
    PartiallyFulfilled,
    Fulfilled,
    Canceled,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::AwaitingReceipt => "AWAITING_RECEIPT",
            PendingStatus::PartiallyFulfilled => "PARTIALLY_FULFILLED",
            PendingStatus::Fulfilled => "FULFILLED",
            PendingStatus::Canceled => "CANCELED",
        }
    }

    /// Open allocations are still waiting for stock
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PendingStatus::AwaitingReceipt | PendingStatus::PartiallyFulfilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Transition table; nothing leaves a terminal state
    pub fn can_transition_to(&self, next: PendingStatus) -> bool {
        use PendingStatus::*;
        matches!(
            (self, next),
            (AwaitingReceipt, PartiallyFulfilled)
                | (AwaitingReceipt, Fulfilled)
                | (AwaitingReceipt, Canceled)
                | (PartiallyFulfilled, PartiallyFulfilled)
                | (PartiallyFulfilled, Fulfilled)
                | (PartiallyFulfilled, Canceled)
        )
    }
}

impl std::fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown pending allocation status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for PendingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AWAITING_RECEIPT" => Ok(PendingStatus::AwaitingReceipt),
            "PARTIALLY_FULFILLED" => Ok(PendingStatus::PartiallyFulfilled),
            "FULFILLED" => Ok(PendingStatus::Fulfilled),
            "CANCELED" => Ok(PendingStatus::Canceled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Rejected status change
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("pending allocation {id} cannot move from {from} to {to}")]
    NotAllowed {
        id: Uuid,
        from: PendingStatus,
        to: PendingStatus,
    },

    #[error("pending allocation {id} has {outstanding} outstanding, cannot fulfil {requested}")]
    OverFulfilled {
        id: Uuid,
        outstanding: Decimal,
        requested: Decimal,
    },
}

/// Demand that could not be satisfied from layers when it was allocated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAllocation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    /// Shortfall recorded at allocation time; never changes
    pub quantity: Decimal,
    pub quantity_fulfilled: Decimal,
    pub estimated_unit_cost: Decimal,
    pub estimated_total_cost: Decimal,
    pub actual_cost_to_date: Decimal,
    pub estimated_movement_id: Option<Uuid>,
    pub status: PendingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PendingAllocation {
    /// Quantity still waiting for stock
    pub fn outstanding(&self) -> Decimal {
        self.quantity - self.quantity_fulfilled
    }

    fn transition(&mut self, next: PendingStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::NotAllowed {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record stock matched against this allocation.
    ///
    /// Moves to FULFILLED once nothing is outstanding, otherwise to
    /// PARTIALLY_FULFILLED.
    pub fn apply_fulfilment(
        &mut self,
        quantity: Decimal,
        actual_cost: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let outstanding = self.outstanding();
        if quantity <= Decimal::ZERO || quantity > outstanding {
            return Err(TransitionError::OverFulfilled {
                id: self.id,
                outstanding,
                requested: quantity,
            });
        }

        let next = if quantity == outstanding {
            PendingStatus::Fulfilled
        } else {
            PendingStatus::PartiallyFulfilled
        };
        self.transition(next)?;

        self.quantity_fulfilled += quantity;
        self.actual_cost_to_date += actual_cost;
        self.updated_at = now;
        if next == PendingStatus::Fulfilled {
            self.fulfilled_at = Some(now);
        }
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(PendingStatus::Canceled)?;
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            if self.notes.is_empty() {
                self.notes = format!("Canceled: {}", reason);
            } else {
                self.notes = format!("{} | Canceled: {}", self.notes, reason);
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pending(quantity: i64) -> PendingAllocation {
        let now = Utc::now();
        PendingAllocation {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            work_order_id: None,
            order_id: None,
            order_line_id: None,
            quantity: Decimal::from(quantity),
            quantity_fulfilled: Decimal::ZERO,
            estimated_unit_cost: Decimal::from(6),
            estimated_total_cost: Decimal::from(6 * quantity),
            actual_cost_to_date: Decimal::ZERO,
            estimated_movement_id: None,
            status: PendingStatus::AwaitingReceipt,
            notes: String::new(),
            created_at: now,
            fulfilled_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_transition_table() {
        use PendingStatus::*;
        assert!(AwaitingReceipt.can_transition_to(PartiallyFulfilled));
        assert!(AwaitingReceipt.can_transition_to(Fulfilled));
        assert!(AwaitingReceipt.can_transition_to(Canceled));
        assert!(PartiallyFulfilled.can_transition_to(Fulfilled));
        assert!(PartiallyFulfilled.can_transition_to(Canceled));
        assert!(!PartiallyFulfilled.can_transition_to(AwaitingReceipt));

        for terminal in [Fulfilled, Canceled] {
            for next in [AwaitingReceipt, PartiallyFulfilled, Fulfilled, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            PendingStatus::AwaitingReceipt,
            PendingStatus::PartiallyFulfilled,
            PendingStatus::Fulfilled,
            PendingStatus::Canceled,
        ] {
            assert_eq!(PendingStatus::from_str(status.as_str()), Ok(status));
        }
        assert_eq!(
            PendingStatus::from_str("awaiting_receipt"),
            Ok(PendingStatus::AwaitingReceipt)
        );
        assert!(PendingStatus::from_str("SHIPPED").is_err());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&PendingStatus::PartiallyFulfilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FULFILLED\"");
    }

    #[test]
    fn test_full_fulfilment_sets_timestamp() {
        let mut p = pending(20);
        let now = Utc::now();
        p.apply_fulfilment(Decimal::from(20), Decimal::from(140), now)
            .unwrap();
        assert_eq!(p.status, PendingStatus::Fulfilled);
        assert_eq!(p.fulfilled_at, Some(now));
        assert_eq!(p.outstanding(), Decimal::ZERO);
        assert_eq!(p.actual_cost_to_date, Decimal::from(140));
    }

    #[test]
    fn test_partial_then_full_fulfilment() {
        let mut p = pending(20);
        p.apply_fulfilment(Decimal::from(5), Decimal::from(35), Utc::now())
            .unwrap();
        assert_eq!(p.status, PendingStatus::PartiallyFulfilled);
        assert_eq!(p.outstanding(), Decimal::from(15));
        assert!(p.fulfilled_at.is_none());

        p.apply_fulfilment(Decimal::from(15), Decimal::from(105), Utc::now())
            .unwrap();
        assert_eq!(p.status, PendingStatus::Fulfilled);
        assert_eq!(p.actual_cost_to_date, Decimal::from(140));
    }

    #[test]
    fn test_over_fulfilment_rejected() {
        let mut p = pending(10);
        let err = p
            .apply_fulfilment(Decimal::from(11), Decimal::from(1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::OverFulfilled { .. }));
        assert_eq!(p.status, PendingStatus::AwaitingReceipt);
    }

    #[test]
    fn test_cancel_terminal_rejected() {
        let mut p = pending(10);
        p.cancel(Some("job closed"), Utc::now()).unwrap();
        assert_eq!(p.status, PendingStatus::Canceled);
        assert_eq!(p.notes, "Canceled: job closed");

        let err = p.cancel(None, Utc::now()).unwrap_err();
        assert!(matches!(err, TransitionError::NotAllowed { .. }));

        let err = p
            .apply_fulfilment(Decimal::from(1), Decimal::ONE, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotAllowed { .. }));
    }
}
