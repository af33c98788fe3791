use crate::domain::subscription::Subscription;
use chrono::NaiveDate;

/// 購読ポリシーポート
///
/// 解約・停止を許可するかのビジネスルールを外部から注入する。
/// ライフサイクルの状態遷移はこの判定結果だけを受け取る。
pub trait SubscriptionPolicy: Send + Sync {
    /// 即時解約できるか
    ///
    /// `false`の場合、解約は解約待ち（pending_cancellation）になる。
    fn can_be_canceled(&self, subscription: &Subscription, today: NaiveDate) -> bool;

    /// 停止（inactive化）できるか
    ///
    /// 既定：分割回数の上限が設定されていて、その回数に達している。
    fn can_be_deactivated(&self, subscription: &Subscription) -> bool {
        subscription.installment_limit_reached()
    }
}
