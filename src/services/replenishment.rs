use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    config::ReplenishmentDefaults, errors::ServiceError,
    services::stock_ledger::StockLedgerService,
};

/// Velocities below this are treated as zero: the product is not selling and
/// no runway or restock can be derived from its sales history.
pub const VELOCITY_EPSILON: f64 = 1e-6;

/// Runway at or below this many days is always critical, regardless of
/// configured delivery time.
pub const CRITICAL_RUNWAY_DAYS: f64 = 3.0;

/// Urgency of a restock suggestion, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RestockPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Tunables for a single analysis run. `safety_stock` overrides both the
/// stored per-record floor and the derived one.
#[derive(Debug, Clone)]
pub struct ReplenishmentConfig {
    pub avg_delivery_days: u32,
    pub full_release_days: u32,
    pub safety_stock: Option<i64>,
    pub min_coverage_days: u32,
}

impl ReplenishmentConfig {
    pub fn from_defaults(defaults: &ReplenishmentDefaults) -> Self {
        Self {
            avg_delivery_days: defaults.avg_delivery_days,
            full_release_days: defaults.full_release_days,
            safety_stock: None,
            min_coverage_days: defaults.min_coverage_days,
        }
    }
}

/// Per-product sales observation over the trailing 30 days. `None` sales
/// means the product had no usable history, not zero sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSnapshot {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub units_sold_30d: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockSuggestion {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub on_hand: i64,
    /// Units sold per day over the observation window.
    pub daily_velocity: f64,
    /// Days until stock-out at current velocity; `None` when velocity is
    /// effectively zero.
    pub days_until_stockout: Option<f64>,
    pub safety_floor: i64,
    pub suggested_restock: i64,
    pub priority: RestockPriority,
}

/// Flags (product, warehouse) pairs whose projected runway is too short and
/// sizes a restock for each. Pure arithmetic over snapshots; stock levels are
/// read through the ledger, never mutated.
#[derive(Clone)]
pub struct ReplenishmentService {
    ledger: StockLedgerService,
    defaults: ReplenishmentDefaults,
}

/// Analyzes one (product, warehouse) observation against current stock.
///
/// Returns `None` when the pair needs no attention: runway exceeds
/// `min_coverage_days` and on-hand sits above the safety floor. The safety
/// floor is the explicit override when given, else the stored per-record
/// floor when positive, else `ceil(velocity * full_release_days)`.
pub fn analyze_snapshot(
    snapshot: &SalesSnapshot,
    on_hand: i64,
    stored_safety_stock: i64,
    config: &ReplenishmentConfig,
) -> Option<RestockSuggestion> {
    let units_sold = snapshot.units_sold_30d.unwrap_or(0).max(0);
    let daily_velocity = units_sold as f64 / 30.0;
    let selling = daily_velocity > VELOCITY_EPSILON;

    let days_until_stockout = if selling {
        Some((on_hand.max(0) as f64 / daily_velocity).floor())
    } else {
        None
    };

    let safety_floor = match config.safety_stock {
        Some(floor) => floor,
        None if stored_safety_stock > 0 => stored_safety_stock,
        None => (daily_velocity * config.full_release_days as f64).ceil() as i64,
    };

    let runway_ok = match days_until_stockout {
        Some(days) => days > config.min_coverage_days as f64,
        None => true,
    };
    if runway_ok && on_hand > safety_floor {
        return None;
    }

    let to_floor = (safety_floor - on_hand).max(0);
    let to_coverage = if selling {
        (daily_velocity * config.min_coverage_days as f64).ceil() as i64
    } else {
        0
    };
    let suggested_restock = to_floor.max(to_coverage);
    if suggested_restock == 0 {
        return None;
    }

    let priority = priority_for(days_until_stockout, config);

    Some(RestockSuggestion {
        product_id: snapshot.product_id,
        warehouse_id: snapshot.warehouse_id,
        on_hand,
        daily_velocity,
        days_until_stockout,
        safety_floor,
        suggested_restock,
        priority,
    })
}

/// Urgency from projected runway versus supplier delivery time. Stock that
/// runs out before a replacement order could arrive is high priority at
/// best, and critical when there are only days left.
fn priority_for(days_until_stockout: Option<f64>, config: &ReplenishmentConfig) -> RestockPriority {
    match days_until_stockout {
        Some(days) if days <= CRITICAL_RUNWAY_DAYS => RestockPriority::Critical,
        Some(days) if days <= config.avg_delivery_days as f64 => RestockPriority::High,
        Some(days) if days <= config.min_coverage_days as f64 => RestockPriority::Medium,
        _ => RestockPriority::Low,
    }
}

/// Most urgent first; among equal priorities, shortest runway first with
/// unknown runway last.
fn compare_suggestions(a: &RestockSuggestion, b: &RestockSuggestion) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| {
        match (a.days_until_stockout, b.days_until_stockout) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}

impl ReplenishmentService {
    pub fn new(ledger: StockLedgerService, defaults: ReplenishmentDefaults) -> Self {
        Self { ledger, defaults }
    }

    pub fn default_config(&self) -> ReplenishmentConfig {
        ReplenishmentConfig::from_defaults(&self.defaults)
    }

    /// Analyzes one observation against the current stock record.
    #[instrument(skip(self, config))]
    pub async fn analyze(
        &self,
        snapshot: &SalesSnapshot,
        config: &ReplenishmentConfig,
    ) -> Result<Option<RestockSuggestion>, ServiceError> {
        let record = self
            .ledger
            .get_record(snapshot.product_id, snapshot.warehouse_id)
            .await?;
        let (on_hand, stored_safety_stock) = record
            .map(|r| (r.quantity, r.safety_stock))
            .unwrap_or((0, 0));

        Ok(analyze_snapshot(snapshot, on_hand, stored_safety_stock, config))
    }

    /// Analyzes a batch of observations. A failing item is logged and
    /// skipped rather than aborting the run; failures are returned alongside
    /// the suggestions, sorted most urgent first.
    #[instrument(skip(self, snapshots, config), fields(count = snapshots.len()))]
    pub async fn analyze_batch(
        &self,
        snapshots: &[SalesSnapshot],
        config: &ReplenishmentConfig,
    ) -> Result<(Vec<RestockSuggestion>, Vec<(i64, ServiceError)>), ServiceError> {
        let mut suggestions = Vec::new();
        let mut failures = Vec::new();

        for snapshot in snapshots {
            match self.analyze(snapshot, config).await {
                Ok(Some(suggestion)) => suggestions.push(suggestion),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        product_id = snapshot.product_id,
                        warehouse_id = snapshot.warehouse_id,
                        error = %e,
                        "replenishment analysis failed for item"
                    );
                    failures.push((snapshot.product_id, e));
                }
            }
        }

        suggestions.sort_by(compare_suggestions);

        info!(
            analyzed = snapshots.len(),
            flagged = suggestions.len(),
            failed = failures.len(),
            "replenishment batch analyzed"
        );

        Ok((suggestions, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn config() -> ReplenishmentConfig {
        ReplenishmentConfig {
            avg_delivery_days: 7,
            full_release_days: 14,
            safety_stock: None,
            min_coverage_days: 30,
        }
    }

    fn snapshot(units_sold_30d: Option<i64>) -> SalesSnapshot {
        SalesSnapshot {
            product_id: 1,
            warehouse_id: 1,
            units_sold_30d,
        }
    }

    #[test]
    fn healthy_stock_is_not_flagged() {
        // 1 unit/day, 90 on hand: 90 days of runway, floor 14.
        let out = analyze_snapshot(&snapshot(Some(30)), 90, 0, &config());
        assert!(out.is_none());
    }

    #[test]
    fn zero_velocity_above_floor_is_not_flagged() {
        let out = analyze_snapshot(&snapshot(Some(0)), 5, 3, &config());
        assert!(out.is_none());
    }

    #[test]
    fn zero_velocity_below_stored_floor_is_flagged_without_runway() {
        let out = analyze_snapshot(&snapshot(Some(0)), 2, 10, &config()).unwrap();
        assert_eq!(out.days_until_stockout, None);
        assert_eq!(out.safety_floor, 10);
        assert_eq!(out.suggested_restock, 8);
        assert_eq!(out.priority, RestockPriority::Low);
    }

    #[test]
    fn missing_history_is_treated_as_zero_velocity() {
        let out = analyze_snapshot(&snapshot(None), 0, 0, &config());
        assert!(out.is_none());
    }

    #[test]
    fn short_runway_is_critical() {
        // 2 units/day, 6 on hand: 3 days of runway, floor 6 at
        // full_release_days = 3.
        let cfg = ReplenishmentConfig {
            avg_delivery_days: 7,
            full_release_days: 3,
            safety_stock: None,
            min_coverage_days: 30,
        };
        let out = analyze_snapshot(&snapshot(Some(60)), 6, 0, &cfg).unwrap();
        assert_eq!(out.safety_floor, 6);
        assert_eq!(out.days_until_stockout, Some(3.0));
        assert_eq!(out.priority, RestockPriority::Critical);
        // Coverage target dominates: ceil(2 * 30) = 60.
        assert_eq!(out.suggested_restock, 60);
    }

    #[test]
    fn explicit_safety_stock_overrides_stored_and_derived() {
        let mut cfg = config();
        cfg.safety_stock = Some(100);
        let out = analyze_snapshot(&snapshot(Some(30)), 90, 5, &cfg).unwrap();
        assert_eq!(out.safety_floor, 100);
    }

    #[test_case(3.0 => RestockPriority::Critical ; "days away from stockout")]
    #[test_case(5.0 => RestockPriority::High ; "within delivery window")]
    #[test_case(20.0 => RestockPriority::Medium ; "within coverage window")]
    #[test_case(45.0 => RestockPriority::Low ; "beyond coverage window")]
    fn priority_bands(days: f64) -> RestockPriority {
        priority_for(Some(days), &config())
    }

    #[test]
    fn suggestions_sort_most_urgent_first_with_unknown_runway_last() {
        let mk = |priority, days| RestockSuggestion {
            product_id: 1,
            warehouse_id: 1,
            on_hand: 0,
            daily_velocity: 1.0,
            days_until_stockout: days,
            safety_floor: 1,
            suggested_restock: 1,
            priority,
        };
        let mut v = vec![
            mk(RestockPriority::Low, None),
            mk(RestockPriority::Critical, Some(5.0)),
            mk(RestockPriority::Critical, Some(2.0)),
            mk(RestockPriority::Low, Some(40.0)),
        ];
        v.sort_by(compare_suggestions);
        assert_eq!(v[0].days_until_stockout, Some(2.0));
        assert_eq!(v[1].days_until_stockout, Some(5.0));
        assert_eq!(v[2].days_until_stockout, Some(40.0));
        assert_eq!(v[3].days_until_stockout, None);
    }

    #[test]
    fn priority_ordering_is_monotone() {
        assert!(RestockPriority::Critical > RestockPriority::High);
        assert!(RestockPriority::High > RestockPriority::Medium);
        assert!(RestockPriority::Medium > RestockPriority::Low);
    }
}
