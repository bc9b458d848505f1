use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Price fields as reported by the external marketplace, in decimal
/// major-unit currency. `regular` is the pre-discount amount accompanying a
/// promotion; `stored_discount_pct` is the discount the marketplace claims
/// to be applying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawListingPrice {
    pub standard: Decimal,
    pub promotion: Option<Decimal>,
    pub regular: Option<Decimal>,
    pub stored_discount_pct: Option<i64>,
}

/// Prices normalized to integer minor units. `effective_minor` is the
/// promotion price when one exists, else the standard price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPrice {
    pub standard_minor: i64,
    pub promotion_minor: Option<i64>,
    pub effective_minor: i64,
    pub discount_pct: Option<i64>,
    /// The marketplace's stored discount disagrees with the recomputed one.
    /// Informational; the canonical price is still produced.
    pub discount_inconsistent: bool,
}

/// Converts a decimal major-unit amount to integer minor units, rounding
/// half away from zero. This is the single conversion point for externally
/// reported prices; everything downstream works in minor units only.
pub fn to_minor_units(major: Decimal) -> Result<i64, ServiceError> {
    (major * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("price {} out of representable range", major))
        })
}

/// Discount of `promotion` relative to `regular`, as a whole percentage
/// rounded to nearest. Both in minor units; `regular` must be positive.
pub fn discount_percentage(regular_minor: i64, promotion_minor: i64) -> Option<i64> {
    if regular_minor <= 0 {
        return None;
    }
    let regular = Decimal::from(regular_minor);
    let promotion = Decimal::from(promotion_minor);
    ((regular - promotion) / regular * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Normalizes one reported listing price and checks the stored discount
/// against a freshly computed one. Inconsistency is logged, never an error.
#[instrument(skip(raw), fields(standard = %raw.standard))]
pub fn reconcile(raw: &RawListingPrice) -> Result<CanonicalPrice, ServiceError> {
    for (label, value) in [
        ("standard", Some(raw.standard)),
        ("promotion", raw.promotion),
        ("regular", raw.regular),
    ] {
        if let Some(price) = value {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "{} price {} cannot be negative",
                    label, price
                )));
            }
        }
    }

    let standard_minor = to_minor_units(raw.standard)?;
    let promotion_minor = raw.promotion.map(to_minor_units).transpose()?;
    let regular_minor = raw.regular.map(to_minor_units).transpose()?;

    let discount_pct = match (promotion_minor, regular_minor) {
        (Some(promo), Some(regular)) => discount_percentage(regular, promo),
        _ => None,
    };

    let discount_inconsistent = match (raw.stored_discount_pct, discount_pct) {
        (Some(stored), Some(computed)) if stored != computed => {
            warn!(
                stored_discount_pct = stored,
                computed_discount_pct = computed,
                "stored discount disagrees with recomputed discount"
            );
            true
        }
        _ => false,
    };

    Ok(CanonicalPrice {
        standard_minor,
        promotion_minor,
        effective_minor: promotion_minor.unwrap_or(standard_minor),
        discount_pct,
        discount_inconsistent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(standard: Decimal) -> RawListingPrice {
        RawListingPrice {
            standard,
            promotion: None,
            regular: None,
            stored_discount_pct: None,
        }
    }

    #[test]
    fn major_units_convert_once_to_minor() {
        assert_eq!(to_minor_units(dec!(49.90)).unwrap(), 4990);
        assert_eq!(to_minor_units(dec!(0.005)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(100)).unwrap(), 10000);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn promotion_discount_is_rounded_percentage() {
        // 39.90 against 49.90 is a 20.04% discount, rounded to 20.
        assert_eq!(discount_percentage(4990, 3990), Some(20));
        assert_eq!(discount_percentage(10000, 5000), Some(50));
        assert_eq!(discount_percentage(0, 1000), None);
    }

    #[test]
    fn standard_only_listing() {
        let price = reconcile(&raw(dec!(49.90))).unwrap();
        assert_eq!(price.standard_minor, 4990);
        assert_eq!(price.promotion_minor, None);
        assert_eq!(price.effective_minor, 4990);
        assert_eq!(price.discount_pct, None);
        assert!(!price.discount_inconsistent);
    }

    #[test]
    fn promotion_takes_effect_and_discount_is_computed() {
        let mut listing = raw(dec!(49.90));
        listing.promotion = Some(dec!(39.90));
        listing.regular = Some(dec!(49.90));
        let price = reconcile(&listing).unwrap();
        assert_eq!(price.effective_minor, 3990);
        assert_eq!(price.discount_pct, Some(20));
        assert!(!price.discount_inconsistent);
    }

    #[test]
    fn stored_discount_mismatch_is_flagged_not_fatal() {
        let mut listing = raw(dec!(49.90));
        listing.promotion = Some(dec!(39.90));
        listing.regular = Some(dec!(49.90));
        listing.stored_discount_pct = Some(25);
        let price = reconcile(&listing).unwrap();
        assert!(price.discount_inconsistent);
        assert_eq!(price.discount_pct, Some(20));
        assert_eq!(price.effective_minor, 3990);
    }

    #[test]
    fn matching_stored_discount_is_consistent() {
        let mut listing = raw(dec!(49.90));
        listing.promotion = Some(dec!(39.90));
        listing.regular = Some(dec!(49.90));
        listing.stored_discount_pct = Some(20);
        let price = reconcile(&listing).unwrap();
        assert!(!price.discount_inconsistent);
    }

    #[test]
    fn negative_standard_price_is_rejected() {
        let err = reconcile(&raw(dec!(-1.00))).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn negative_promotion_and_regular_prices_are_rejected() {
        let mut listing = raw(dec!(49.90));
        listing.promotion = Some(dec!(-39.90));
        let err = reconcile(&listing).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        let mut listing = raw(dec!(49.90));
        listing.promotion = Some(dec!(39.90));
        listing.regular = Some(dec!(-49.90));
        let err = reconcile(&listing).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
