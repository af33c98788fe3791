use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::schedule;
use super::{
    ActionableDateAdvanced, AdvanceSubscriptionError, CancelSubscriptionError, ClaimCycleError,
    CycleClaimed, CycleReleased, DeactivateSubscriptionError, InstallmentId, InstallmentRecorded,
    Interval, LineItemId, OrderId, RecordInstallmentError, ReleaseCycleError, ShippingAddress,
    SubscriptionActivated, SubscriptionCanceled, SubscriptionDeactivated, SubscriptionId,
    SubscriptionValidationError, UserId,
};

// ============================================================================
// 明細と分割回
// ============================================================================

/// 購読明細 - 定期購入される商品の注文明細
///
/// 購読が作成された後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_item_id: LineItemId,
    /// 元の注文
    pub order_id: OrderId,
    pub interval: Interval,
    pub start_date: Option<NaiveDate>,
    /// `None`は無制限
    pub max_installments: Option<u32>,
}

/// 分割回 - 処理済みの1周期分の記録
///
/// 追記のみ。作成後に変更・削除されることはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub installment_id: InstallmentId,
    /// 処理した周期の処理日
    pub cycle_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// 周期の確保 - 処理中の周期を他の処理から守る印
///
/// 確保した処理が異常終了した場合に備え、確保期限を過ぎた印は奪い取れる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleClaim {
    pub cycle_date: NaiveDate,
    pub claimed_at: DateTime<Utc>,
}

impl CycleClaim {
    pub fn is_expired(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        self.claimed_at + lease <= now
    }
}

// ============================================================================
// 型安全な状態
// ============================================================================

/// 購読の状態
///
/// 処理日はactive状態だけが持つ。
/// 「処理日が存在する ⇔ active」という不変条件を型で表現する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionState {
    Active { actionable_date: NaiveDate },
    Canceled,
    PendingCancellation,
    Inactive,
}

impl SubscriptionState {
    /// 永続化用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Active { .. } => "active",
            SubscriptionState::Canceled => "canceled",
            SubscriptionState::PendingCancellation => "pending_cancellation",
            SubscriptionState::Inactive => "inactive",
        }
    }

    /// 永続化された状態名と処理日から状態を復元する
    ///
    /// activeなのに処理日がない、または終端状態なのに処理日がある組み合わせは拒否する。
    pub fn from_parts(state: &str, actionable_date: Option<NaiveDate>) -> Result<Self, String> {
        match (state, actionable_date) {
            ("active", Some(actionable_date)) => Ok(SubscriptionState::Active { actionable_date }),
            ("canceled", None) => Ok(SubscriptionState::Canceled),
            ("pending_cancellation", None) => Ok(SubscriptionState::PendingCancellation),
            ("inactive", None) => Ok(SubscriptionState::Inactive),
            (state, date) => Err(format!(
                "Invalid subscription state: state={}, actionable_date={:?}",
                state, date
            )),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionState::Active { .. })
    }

    /// active以外はすべて終端状態
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn actionable_date(&self) -> Option<NaiveDate> {
        match self {
            SubscriptionState::Active { actionable_date } => Some(*actionable_date),
            _ => None,
        }
    }
}

// ============================================================================
// Subscription集約
// ============================================================================

/// Subscription集約 - 1つの明細から生まれる定期的な義務
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    // 識別子
    pub subscription_id: SubscriptionId,

    // 他の集約への参照（IDのみ）
    pub user_id: UserId,

    // 購読管理の責務
    pub line_item: LineItem,
    pub shipping_address: Option<ShippingAddress>,
    pub state: SubscriptionState,
    pub installments: Vec<Installment>,
    /// 処理中の周期（active状態のときだけ持つ）
    pub claim: Option<CycleClaim>,

    // 楽観的排他制御用のバージョン（永続化ごとに1つ増える）
    pub version: u32,

    // 監査情報
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn actionable_date(&self) -> Option<NaiveDate> {
        self.state.actionable_date()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn interval(&self) -> Interval {
        self.line_item.interval
    }

    /// 分割回数が上限に達したか（上限が設定されている場合のみ）
    pub fn installment_limit_reached(&self) -> bool {
        self.line_item
            .max_installments
            .is_some_and(|max| self.installments.len() >= max as usize)
    }
}

// ============================================================================
// 純粋関数：状態遷移
// ============================================================================

/// 純粋関数：明細から購読を作成する
///
/// ビジネスルール：
/// - 会員が必須（ゲスト注文からは作成できない）
/// - 状態はactive
/// - 初回処理日は明細の開始日（なければ当日）から計算し、同単位のピアと衝突させない
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn activate_subscription(
    user_id: Option<UserId>,
    line_item: LineItem,
    shipping_address: Option<ShippingAddress>,
    peers: &[Subscription],
    today: NaiveDate,
    activated_at: DateTime<Utc>,
) -> Result<(Subscription, SubscriptionActivated), SubscriptionValidationError> {
    let user_id = user_id.ok_or(SubscriptionValidationError::MissingUser)?;
    let actionable_date = schedule::first_actionable_date(&line_item, user_id, today, peers)
        .ok_or(SubscriptionValidationError::DateOutOfRange)?;

    let subscription = Subscription {
        subscription_id: SubscriptionId::new(),
        user_id,
        line_item,
        shipping_address,
        state: SubscriptionState::Active { actionable_date },
        installments: Vec::new(),
        claim: None,
        version: 0,
        created_at: activated_at,
        updated_at: activated_at,
    };

    let event = SubscriptionActivated {
        subscription_id: subscription.subscription_id,
        user_id,
        line_item_id: subscription.line_item.line_item_id,
        actionable_date,
        activated_at,
    };

    Ok((subscription, event))
}

/// 純粋関数：購読を解約する
///
/// ビジネスルール：
/// - 解約可能ならcanceled、そうでなければpending_cancellation
/// - どちらの場合も処理日は消える
/// - 終端状態からは遷移しない
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn cancel_subscription(
    subscription: Subscription,
    can_be_canceled: bool,
    canceled_at: DateTime<Utc>,
) -> Result<(Subscription, SubscriptionCanceled), CancelSubscriptionError> {
    if subscription.state.is_terminal() {
        return Err(CancelSubscriptionError::AlreadyEnded);
    }

    let state = if can_be_canceled {
        SubscriptionState::Canceled
    } else {
        SubscriptionState::PendingCancellation
    };

    let event = SubscriptionCanceled {
        subscription_id: subscription.subscription_id,
        immediate: can_be_canceled,
        canceled_at,
    };

    let canceled = Subscription {
        state,
        claim: None,
        updated_at: canceled_at,
        ..subscription
    };

    Ok((canceled, event))
}

/// 純粋関数：購読を停止する
///
/// ビジネスルール：
/// - active状態のみ
/// - 停止条件（既定では分割回数が上限に到達）を満たしている場合のみ
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn deactivate_subscription(
    subscription: Subscription,
    can_be_deactivated: bool,
    deactivated_at: DateTime<Utc>,
) -> Result<(Subscription, SubscriptionDeactivated), DeactivateSubscriptionError> {
    if !subscription.is_active() {
        return Err(DeactivateSubscriptionError::NotActive);
    }
    if !can_be_deactivated {
        return Err(DeactivateSubscriptionError::InstallmentLimitNotReached);
    }

    let event = SubscriptionDeactivated {
        subscription_id: subscription.subscription_id,
        installment_count: subscription.installments.len(),
        deactivated_at,
    };

    let deactivated = Subscription {
        state: SubscriptionState::Inactive,
        claim: None,
        updated_at: deactivated_at,
        ..subscription
    };

    Ok((deactivated, event))
}

/// 純粋関数：処理日を次の周期へ進める
///
/// 次の処理日は`schedule::next_actionable_date`に委譲する。
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn advance_actionable_date(
    subscription: Subscription,
    peers: &[Subscription],
    advanced_at: DateTime<Utc>,
) -> Result<(Subscription, ActionableDateAdvanced), AdvanceSubscriptionError> {
    let old_actionable_date = subscription
        .actionable_date()
        .ok_or(AdvanceSubscriptionError::NotActive)?;
    let new_actionable_date = schedule::next_actionable_date(&subscription, peers)
        .ok_or(AdvanceSubscriptionError::DateOutOfRange)?;

    let event = ActionableDateAdvanced {
        subscription_id: subscription.subscription_id,
        old_actionable_date,
        new_actionable_date,
        advanced_at,
    };

    let advanced = Subscription {
        state: SubscriptionState::Active {
            actionable_date: new_actionable_date,
        },
        claim: None,
        updated_at: advanced_at,
        ..subscription
    };

    Ok((advanced, event))
}

/// 純粋関数：分割回を記録する
///
/// ビジネスルール：
/// - active状態のみ
/// - 上限に達している購読には追加できない
/// - 状態と処理日は変えない（停止・前進は呼び出し側が続けて行う）
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn record_installment(
    subscription: Subscription,
    cycle_date: NaiveDate,
    recorded_at: DateTime<Utc>,
) -> Result<(Subscription, InstallmentRecorded), RecordInstallmentError> {
    if !subscription.is_active() {
        return Err(RecordInstallmentError::NotActive);
    }
    if subscription.installment_limit_reached() {
        return Err(RecordInstallmentError::InstallmentLimitReached);
    }

    let installment = Installment {
        installment_id: InstallmentId::new(),
        cycle_date,
        created_at: recorded_at,
    };

    let mut installments = subscription.installments;
    installments.push(installment.clone());

    let event = InstallmentRecorded {
        subscription_id: subscription.subscription_id,
        installment_id: installment.installment_id,
        cycle_date,
        installment_count: installments.len(),
        recorded_at,
    };

    let recorded = Subscription {
        installments,
        updated_at: recorded_at,
        ..subscription
    };

    Ok((recorded, event))
}

/// 純粋関数：処理日の周期を確保する
///
/// ビジネスルール：
/// - active状態で、処理日が指定の周期と一致する場合のみ
/// - 確保期限内の印が既にあれば確保できない
///
/// 副作用なし。新しいSubscriptionとイベントを返す。
pub fn claim_cycle(
    subscription: Subscription,
    cycle_date: NaiveDate,
    lease: Duration,
    claimed_at: DateTime<Utc>,
) -> Result<(Subscription, CycleClaimed), ClaimCycleError> {
    let actionable_date = subscription
        .actionable_date()
        .ok_or(ClaimCycleError::NotActive)?;
    if actionable_date != cycle_date {
        return Err(ClaimCycleError::NotDue);
    }
    if subscription
        .claim
        .is_some_and(|claim| !claim.is_expired(lease, claimed_at))
    {
        return Err(ClaimCycleError::AlreadyClaimed);
    }

    let event = CycleClaimed {
        subscription_id: subscription.subscription_id,
        cycle_date,
        claimed_at,
    };

    let claimed = Subscription {
        claim: Some(CycleClaim {
            cycle_date,
            claimed_at,
        }),
        updated_at: claimed_at,
        ..subscription
    };

    Ok((claimed, event))
}

/// 純粋関数：確保した周期を未処理のまま解放する
///
/// 処理日は変えないので、次の巡回で再び処理対象になる。
pub fn release_cycle(
    subscription: Subscription,
    cycle_date: NaiveDate,
    released_at: DateTime<Utc>,
) -> Result<(Subscription, CycleReleased), ReleaseCycleError> {
    if !subscription
        .claim
        .is_some_and(|claim| claim.cycle_date == cycle_date)
    {
        return Err(ReleaseCycleError::NotClaimed);
    }

    let event = CycleReleased {
        subscription_id: subscription.subscription_id,
        cycle_date,
        released_at,
    };

    let released = Subscription {
        claim: None,
        updated_at: released_at,
        ..subscription
    };

    Ok((released, event))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::IntervalUnit;

    // activate_subscription() のテスト
    #[test]
    fn test_activate_subscription_sets_first_actionable_date() {
        let user_id = UserId::new();
        let item = line_item(IntervalUnit::Week, 1);
        let today = date(2016, 10, 5);
        let now = Utc::now();

        let (subscription, event) =
            activate_subscription(Some(user_id), item.clone(), None, &[], today, now).unwrap();

        assert_eq!(subscription.user_id, user_id);
        assert_eq!(subscription.line_item, item);
        assert_eq!(subscription.actionable_date(), Some(date(2016, 10, 12)));
        assert!(subscription.installments.is_empty());
        assert_eq!(subscription.version, 0);

        // イベントの検証
        assert_eq!(event.subscription_id, subscription.subscription_id);
        assert_eq!(event.line_item_id, item.line_item_id);
        assert_eq!(event.actionable_date, date(2016, 10, 12));
    }

    #[test]
    fn test_activate_subscription_requires_user() {
        let item = line_item(IntervalUnit::Month, 1);
        let result = activate_subscription(None, item, None, &[], date(2016, 10, 5), Utc::now());
        assert_eq!(result.unwrap_err(), SubscriptionValidationError::MissingUser);
    }

    #[test]
    fn test_activate_subscription_copies_shipping_address() {
        let address = ShippingAddress {
            name: "Jane Doe".to_string(),
            address1: "1 Main St".to_string(),
            address2: None,
            city: "Springfield".to_string(),
            state: Some("OR".to_string()),
            zipcode: "97477".to_string(),
            country_code: "US".to_string(),
            phone: None,
        };

        let (subscription, _) = activate_subscription(
            Some(UserId::new()),
            line_item(IntervalUnit::Month, 1),
            Some(address.clone()),
            &[],
            date(2016, 10, 5),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(subscription.shipping_address, Some(address));
    }

    // cancel_subscription() のテスト
    #[test]
    fn test_cancel_subscription_when_allowed() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));

        let (canceled, event) = cancel_subscription(subscription, true, Utc::now()).unwrap();

        assert_eq!(canceled.state, SubscriptionState::Canceled);
        assert_eq!(canceled.actionable_date(), None);
        assert!(event.immediate);
    }

    #[test]
    fn test_cancel_subscription_when_not_allowed_is_pending() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));

        let (pending, event) = cancel_subscription(subscription, false, Utc::now()).unwrap();

        assert_eq!(pending.state, SubscriptionState::PendingCancellation);
        assert_eq!(pending.actionable_date(), None);
        assert!(!event.immediate);
    }

    #[test]
    fn test_cancel_subscription_fails_when_already_ended() {
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        subscription.state = SubscriptionState::Inactive;

        let result = cancel_subscription(subscription, true, Utc::now());
        assert_eq!(result.unwrap_err(), CancelSubscriptionError::AlreadyEnded);
    }

    // deactivate_subscription() のテスト
    #[test]
    fn test_deactivate_subscription_when_limit_reached() {
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        subscription.line_item.max_installments = Some(1);
        subscription.installments = installments(2);
        assert!(subscription.installment_limit_reached());

        let (deactivated, event) =
            deactivate_subscription(subscription, true, Utc::now()).unwrap();

        assert_eq!(deactivated.state, SubscriptionState::Inactive);
        assert_eq!(deactivated.actionable_date(), None);
        assert_eq!(event.installment_count, 2);
    }

    #[test]
    fn test_deactivate_subscription_fails_below_limit() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));

        let result = deactivate_subscription(subscription, false, Utc::now());
        assert_eq!(
            result.unwrap_err(),
            DeactivateSubscriptionError::InstallmentLimitNotReached
        );
    }

    #[test]
    fn test_installment_limit_unbounded_without_max() {
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        subscription.installments = installments(50);
        assert!(!subscription.installment_limit_reached());
    }

    // advance_actionable_date() のテスト
    #[test]
    fn test_advance_actionable_date_moves_one_interval() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Month, 1, date(2016, 10, 5));

        let (advanced, event) = advance_actionable_date(subscription, &[], Utc::now()).unwrap();

        assert_eq!(advanced.actionable_date(), Some(date(2016, 11, 5)));
        assert_eq!(event.old_actionable_date, date(2016, 10, 5));
        assert_eq!(event.new_actionable_date, date(2016, 11, 5));
    }

    #[test]
    fn test_advance_actionable_date_fails_when_not_active() {
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Month, 1, date(2016, 10, 5));
        subscription.state = SubscriptionState::PendingCancellation;

        let result = advance_actionable_date(subscription, &[], Utc::now());
        assert_eq!(result.unwrap_err(), AdvanceSubscriptionError::NotActive);
    }

    // record_installment() のテスト
    #[test]
    fn test_record_installment_appends() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));

        let (recorded, event) =
            record_installment(subscription, date(2016, 10, 5), Utc::now()).unwrap();

        assert_eq!(recorded.installments.len(), 1);
        assert_eq!(recorded.installments[0].cycle_date, date(2016, 10, 5));
        assert_eq!(recorded.actionable_date(), Some(date(2016, 10, 5)));
        assert_eq!(event.installment_count, 1);
        assert_eq!(event.installment_id, recorded.installments[0].installment_id);
    }

    #[test]
    fn test_record_installment_fails_at_limit() {
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        subscription.line_item.max_installments = Some(2);
        subscription.installments = installments(2);

        let result = record_installment(subscription, date(2016, 10, 5), Utc::now());
        assert_eq!(
            result.unwrap_err(),
            RecordInstallmentError::InstallmentLimitReached
        );
    }

    #[test]
    fn test_advance_actionable_date_clears_claim() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        let (claimed, _) =
            claim_cycle(subscription, date(2016, 10, 5), Duration::minutes(30), Utc::now())
                .unwrap();

        let (advanced, _) = advance_actionable_date(claimed, &[], Utc::now()).unwrap();

        assert_eq!(advanced.actionable_date(), Some(date(2016, 10, 12)));
        assert_eq!(advanced.claim, None);
    }

    // claim_cycle() / release_cycle() のテスト
    #[test]
    fn test_claim_cycle_marks_due_cycle() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        let now = Utc::now();

        let (claimed, event) =
            claim_cycle(subscription, date(2016, 10, 5), Duration::minutes(30), now).unwrap();

        assert_eq!(
            claimed.claim,
            Some(CycleClaim {
                cycle_date: date(2016, 10, 5),
                claimed_at: now,
            })
        );
        assert_eq!(claimed.actionable_date(), Some(date(2016, 10, 5)));
        assert_eq!(event.cycle_date, date(2016, 10, 5));
    }

    #[test]
    fn test_claim_cycle_rejects_held_claim() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        let lease = Duration::minutes(30);
        let now = Utc::now();
        let (claimed, _) = claim_cycle(subscription, date(2016, 10, 5), lease, now).unwrap();

        let result = claim_cycle(
            claimed,
            date(2016, 10, 5),
            lease,
            now + Duration::minutes(5),
        );
        assert_eq!(result.unwrap_err(), ClaimCycleError::AlreadyClaimed);
    }

    #[test]
    fn test_claim_cycle_takes_over_expired_claim() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        let lease = Duration::minutes(30);
        let now = Utc::now();
        let (claimed, _) = claim_cycle(subscription, date(2016, 10, 5), lease, now).unwrap();

        let later = now + Duration::minutes(31);
        let (reclaimed, _) = claim_cycle(claimed, date(2016, 10, 5), lease, later).unwrap();

        assert_eq!(reclaimed.claim.map(|c| c.claimed_at), Some(later));
    }

    #[test]
    fn test_claim_cycle_rejects_other_cycle() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 12));

        let result = claim_cycle(
            subscription.clone(),
            date(2016, 10, 5),
            Duration::minutes(30),
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), ClaimCycleError::NotDue);

        let canceled = Subscription {
            state: SubscriptionState::Canceled,
            ..subscription
        };
        let result = claim_cycle(canceled, date(2016, 10, 12), Duration::minutes(30), Utc::now());
        assert_eq!(result.unwrap_err(), ClaimCycleError::NotActive);
    }

    #[test]
    fn test_release_cycle_keeps_actionable_date() {
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 5));
        let (claimed, _) =
            claim_cycle(subscription, date(2016, 10, 5), Duration::minutes(30), Utc::now())
                .unwrap();

        let (released, event) = release_cycle(claimed, date(2016, 10, 5), Utc::now()).unwrap();

        assert_eq!(released.claim, None);
        assert_eq!(released.actionable_date(), Some(date(2016, 10, 5)));
        assert_eq!(event.cycle_date, date(2016, 10, 5));

        let result = release_cycle(released, date(2016, 10, 5), Utc::now());
        assert_eq!(result.unwrap_err(), ReleaseCycleError::NotClaimed);
    }

    // SubscriptionState のテスト
    #[test]
    fn test_state_from_parts_round_trips() {
        let active = SubscriptionState::Active {
            actionable_date: date(2016, 10, 5),
        };
        assert_eq!(
            SubscriptionState::from_parts(active.as_str(), active.actionable_date()),
            Ok(active)
        );
        assert_eq!(
            SubscriptionState::from_parts("pending_cancellation", None),
            Ok(SubscriptionState::PendingCancellation)
        );
    }

    #[test]
    fn test_state_from_parts_rejects_inconsistent_rows() {
        assert!(SubscriptionState::from_parts("active", None).is_err());
        assert!(SubscriptionState::from_parts("canceled", Some(date(2016, 10, 5))).is_err());
        assert!(SubscriptionState::from_parts("paused", None).is_err());
    }
}
