pub mod catalog;
pub mod kits;
pub mod marketplace;
pub mod price_reconciler;
pub mod purchase_orders;
pub mod replenishment;
pub mod stock_ledger;
pub mod transfers;
pub mod withdrawals;
