pub mod kit_component;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_movement;
pub mod stock_record;
pub mod warehouse;
