use thiserror::Error;

/// 購読管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum SubscriptionApplicationError {
    /// 明細の元の注文が存在しない
    #[error("Order not found")]
    OrderNotFound,

    /// 購読が見つからない
    #[error("Subscription not found")]
    SubscriptionNotFound,

    /// 購読を作成できない入力（会員のいない注文など）
    #[error("Validation error: {0}")]
    Validation(String),

    /// ドメイン層のエラー
    #[error("Domain error: {0}")]
    DomainError(String),

    /// 再試行しても同時更新の競合が解消しなかった
    #[error("Subscription was modified concurrently")]
    ConcurrentModification,

    /// SubscriptionRepositoryのエラー
    #[error("Subscription repository error")]
    RepositoryError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// OrderServiceのエラー
    #[error("Order service error")]
    OrderServiceError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// InstallmentFulfillmentのエラー
    #[error("Installment fulfillment error")]
    FulfillmentError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, SubscriptionApplicationError>;
