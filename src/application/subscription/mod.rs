mod actionable_processing;
mod errors;
mod subscription_service;

pub use actionable_processing::{ProcessingSummary, process_actionable_subscriptions};
pub use errors::{Result, SubscriptionApplicationError};
pub use subscription_service::{
    InstallmentOutcome, ServiceDependencies, activate, actionable, advance_actionable_date, cancel,
    claim_cycle, deactivate, record_installment, release_cycle,
};
