use crate::domain::subscription::Subscription;
use async_trait::async_trait;
use chrono::NaiveDate;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 分割回の処理ポート
///
/// 処理日を迎えた購読の1周期分（注文作成・決済など）を外部システムに依頼する。
/// 成功した場合のみ分割回が記録され、処理日が進む。
#[async_trait]
pub trait InstallmentFulfillment: Send + Sync {
    async fn fulfill(&self, subscription: &Subscription, cycle_date: NaiveDate) -> Result<()>;
}
