use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Movement kinds recorded in the append-only ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementKind {
    PurchaseReceipt,
    Withdrawal,
    TransferIn,
    TransferOut,
    KitDecrement,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::PurchaseReceipt => "purchase-receipt",
            MovementKind::Withdrawal => "withdrawal",
            MovementKind::TransferIn => "transfer-in",
            MovementKind::TransferOut => "transfer-out",
            MovementKind::KitDecrement => "kit-decrement",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase-receipt" => Some(MovementKind::PurchaseReceipt),
            "withdrawal" => Some(MovementKind::Withdrawal),
            "transfer-in" => Some(MovementKind::TransferIn),
            "transfer-out" => Some(MovementKind::TransferOut),
            "kit-decrement" => Some(MovementKind::KitDecrement),
            _ => None,
        }
    }

    /// Kinds that represent stock leaving a warehouse for a consumer.
    /// A stock record with outbound history must never be deleted.
    pub fn is_outbound(&self) -> bool {
        matches!(self, MovementKind::Withdrawal | MovementKind::KitDecrement)
    }
}

/// Append-only ledger entry. Never mutated after creation; the current
/// `stock_record.quantity` equals the sum of these deltas per pair.
/// `correlation_id` links the entries of one logical operation: kit
/// decrements to their parent withdrawal, transfer-in/out pairs to their
/// parent transfer.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub delta: i64,
    /// Stored as string; converted through `MovementKind`.
    pub kind: String,
    pub correlation_id: Uuid,
    pub occurred_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> Option<MovementKind> {
        MovementKind::from_str(&self.kind)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_kind_string_round_trip() {
        for kind in [
            MovementKind::PurchaseReceipt,
            MovementKind::Withdrawal,
            MovementKind::TransferIn,
            MovementKind::TransferOut,
            MovementKind::KitDecrement,
        ] {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementKind::from_str("reserve"), None);
    }

    #[test]
    fn outbound_kinds() {
        assert!(MovementKind::Withdrawal.is_outbound());
        assert!(MovementKind::KitDecrement.is_outbound());
        assert!(!MovementKind::TransferOut.is_outbound());
        assert!(!MovementKind::PurchaseReceipt.is_outbound());
    }
}
