use crate::domain::subscription::Subscription;
use crate::domain::value_objects::{SubscriptionId, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use std::collections::BTreeMap;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 会員の購読集合のスナップショット
///
/// ピア購読を読み取った時点の`(購読ID, バージョン)`の集合。
/// 書き込み時にこの集合が変わっていないことを検証することで、
/// ピアの読み取りと自身の書き込みの一貫性を保証する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    user_id: UserId,
    versions: BTreeMap<SubscriptionId, u32>,
}

impl PeerSnapshot {
    /// 読み取った購読一覧からスナップショットを作成する
    pub fn capture(user_id: UserId, subscriptions: &[Subscription]) -> Self {
        let versions = subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| (s.subscription_id, s.version))
            .collect();
        Self { user_id, versions }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn versions(&self) -> &BTreeMap<SubscriptionId, u32> {
        &self.versions
    }

    /// 現在の`(購読ID, バージョン)`集合がスナップショットと一致するか
    pub fn matches(&self, current: impl IntoIterator<Item = (SubscriptionId, u32)>) -> bool {
        let current: BTreeMap<SubscriptionId, u32> = current.into_iter().collect();
        current == self.versions
    }
}

/// 更新の前提条件（楽観的排他制御）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// 対象の購読が読み取り時のバージョンのままであること
    Row,
    /// 会員の購読集合全体が読み取り時のスナップショットのままであること
    Snapshot(PeerSnapshot),
}

/// 購読リポジトリポート
///
/// 購読・明細・分割回の永続化を抽象化する。
/// 書き込みはすべて楽観的排他制御で保護され、前提条件を満たさない場合は
/// エラーではなく`Ok(false)`を返す。呼び出し側は最新状態を読み直して再試行する。
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// 新しい購読を保存する
    ///
    /// 会員の購読集合が`snapshot`と一致する場合のみ保存する。
    /// 保存後のバージョンは`subscription.version + 1`。
    async fn insert(&self, subscription: &Subscription, snapshot: &PeerSnapshot) -> Result<bool>;

    /// 既存の購読を更新する
    ///
    /// `subscription.version`は読み取り時のバージョン。前提条件を満たす場合のみ、
    /// 状態・処理日を上書きし、未保存の分割回を追記して、バージョンを1つ進める。
    async fn update(&self, subscription: &Subscription, precondition: &Precondition)
    -> Result<bool>;

    /// IDで購読を取得する
    async fn get_by_id(&self, subscription_id: SubscriptionId) -> Result<Option<Subscription>>;

    /// 会員の全購読を取得する
    ///
    /// 処理日の衝突回避（ピア購読の比較）に使用される。
    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Subscription>>;

    /// 処理対象の購読をストリーム配信する
    ///
    /// active かつ 処理日 <= `as_of` の購読を、処理日・購読IDの順で返す。
    /// 定期実行ジョブの作業キューとして使用される。
    fn stream_actionable(&self, as_of: NaiveDate) -> BoxStream<'_, Result<Subscription>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntervalUnit;
    use crate::domain::subscription::test_support::*;

    #[test]
    fn test_snapshot_captures_only_owner_subscriptions() {
        let user_id = UserId::new();
        let own = active_subscription(user_id, IntervalUnit::Week, 1, date(2016, 10, 5));
        let other = active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));

        let snapshot = PeerSnapshot::capture(user_id, &[own.clone(), other]);

        assert_eq!(snapshot.versions().len(), 1);
        assert_eq!(snapshot.versions().get(&own.subscription_id), Some(&0));
    }

    #[test]
    fn test_snapshot_detects_changed_version_and_new_rows() {
        let user_id = UserId::new();
        let own = active_subscription(user_id, IntervalUnit::Week, 1, date(2016, 10, 5));
        let snapshot = PeerSnapshot::capture(user_id, std::slice::from_ref(&own));

        assert!(snapshot.matches([(own.subscription_id, 0)]));
        assert!(!snapshot.matches([(own.subscription_id, 1)]));
        assert!(!snapshot.matches([(own.subscription_id, 0), (SubscriptionId::new(), 0)]));
        assert!(!snapshot.matches(Vec::<(SubscriptionId, u32)>::new()));
    }
}
