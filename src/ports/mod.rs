pub mod installment_fulfillment;
pub mod order_service;
pub mod subscription_policy;
pub mod subscription_repository;

pub use installment_fulfillment::*;
pub use order_service::*;
pub use subscription_policy::*;
pub use subscription_repository::*;
