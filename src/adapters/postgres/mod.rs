pub mod subscription_repository;

// パブリックに型を再エクスポート
pub use subscription_repository::SubscriptionRepository as PostgresSubscriptionRepository;
