use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{InstallmentId, LineItemId, SubscriptionId, UserId};

/// イベント：明細から購読が作成された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionActivated {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub line_item_id: LineItemId,
    pub actionable_date: NaiveDate,
    pub activated_at: DateTime<Utc>,
}

/// イベント：購読が解約された（即時または解約待ち）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCanceled {
    pub subscription_id: SubscriptionId,
    /// `false`の場合は解約待ち（pending_cancellation）
    pub immediate: bool,
    pub canceled_at: DateTime<Utc>,
}

/// イベント：分割回数の上限に達して停止した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDeactivated {
    pub subscription_id: SubscriptionId,
    pub installment_count: usize,
    pub deactivated_at: DateTime<Utc>,
}

/// イベント：次の処理日が前進した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableDateAdvanced {
    pub subscription_id: SubscriptionId,
    pub old_actionable_date: NaiveDate,
    pub new_actionable_date: NaiveDate,
    pub advanced_at: DateTime<Utc>,
}

/// イベント：分割回が記録された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentRecorded {
    pub subscription_id: SubscriptionId,
    pub installment_id: InstallmentId,
    pub cycle_date: NaiveDate,
    pub installment_count: usize,
    pub recorded_at: DateTime<Utc>,
}

/// イベント：周期が処理のために確保された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleClaimed {
    pub subscription_id: SubscriptionId,
    pub cycle_date: NaiveDate,
    pub claimed_at: DateTime<Utc>,
}

/// イベント：確保した周期が未処理のまま解放された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReleased {
    pub subscription_id: SubscriptionId,
    pub cycle_date: NaiveDate,
    pub released_at: DateTime<Utc>,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    SubscriptionActivated(SubscriptionActivated),
    SubscriptionCanceled(SubscriptionCanceled),
    SubscriptionDeactivated(SubscriptionDeactivated),
    ActionableDateAdvanced(ActionableDateAdvanced),
    InstallmentRecorded(InstallmentRecorded),
    CycleClaimed(CycleClaimed),
    CycleReleased(CycleReleased),
}

impl DomainEvent {
    /// ログ出力用のイベント種別
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::SubscriptionActivated(_) => "SubscriptionActivated",
            DomainEvent::SubscriptionCanceled(_) => "SubscriptionCanceled",
            DomainEvent::SubscriptionDeactivated(_) => "SubscriptionDeactivated",
            DomainEvent::ActionableDateAdvanced(_) => "ActionableDateAdvanced",
            DomainEvent::InstallmentRecorded(_) => "InstallmentRecorded",
            DomainEvent::CycleClaimed(_) => "CycleClaimed",
            DomainEvent::CycleReleased(_) => "CycleReleased",
        }
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            DomainEvent::SubscriptionActivated(e) => e.subscription_id,
            DomainEvent::SubscriptionCanceled(e) => e.subscription_id,
            DomainEvent::SubscriptionDeactivated(e) => e.subscription_id,
            DomainEvent::ActionableDateAdvanced(e) => e.subscription_id,
            DomainEvent::InstallmentRecorded(e) => e.subscription_id,
            DomainEvent::CycleClaimed(e) => e.subscription_id,
            DomainEvent::CycleReleased(e) => e.subscription_id,
        }
    }
}
