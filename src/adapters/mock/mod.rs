pub mod installment_fulfillment;
pub mod order_service;

pub use installment_fulfillment::InstallmentFulfillment;
pub use order_service::OrderService;
