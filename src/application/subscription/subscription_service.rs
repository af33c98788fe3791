use crate::domain::subscription::{LineItem, Subscription, SubscriptionState};
use crate::domain::{self, DomainEvent, value_objects::*};
use crate::ports::*;
use chrono::{Duration, NaiveDate, Utc};
use futures::TryStreamExt;
use std::sync::Arc;

use super::errors::{Result, SubscriptionApplicationError};

/// 同時更新の競合時に書き込みを試みる最大回数
const MAX_WRITE_ATTEMPTS: usize = 3;

/// 確保した周期を他の処理が奪い取れるようになるまでの時間（分）
const CYCLE_CLAIM_LEASE_MINUTES: i64 = 30;

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、純粋な関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub subscription_repository: Arc<dyn SubscriptionRepository>,
    pub order_service: Arc<dyn OrderService>,
    pub policy: Arc<dyn SubscriptionPolicy>,
    pub fulfillment: Arc<dyn InstallmentFulfillment>,
}

/// 分割回を記録した結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallmentOutcome {
    /// 次の処理日へ進んだ
    Advanced(NaiveDate),
    /// 分割回数の上限に達して停止した
    Deactivated,
    /// 読み直した時点で対象の周期ではなくなっていた（終端状態・処理済み）
    Skipped,
}

/// リポジトリから購読を読み込むヘルパー関数
///
/// cancel, deactivate, advance_actionable_date, record_installmentで共通利用される。
async fn load_subscription(
    repository: &Arc<dyn SubscriptionRepository>,
    subscription_id: SubscriptionId,
) -> Result<Subscription> {
    repository
        .get_by_id(subscription_id)
        .await
        .map_err(SubscriptionApplicationError::RepositoryError)?
        .ok_or(SubscriptionApplicationError::SubscriptionNotFound)
}

/// 会員の購読一覧（ピア）を読み込むヘルパー関数
async fn load_peers(
    repository: &Arc<dyn SubscriptionRepository>,
    user_id: UserId,
) -> Result<Vec<Subscription>> {
    repository
        .find_by_user_id(user_id)
        .await
        .map_err(SubscriptionApplicationError::RepositoryError)
}

/// 保存に成功したドメインイベントをログに出力する
fn log_event(event: &DomainEvent) {
    tracing::info!(
        event_type = event.event_type(),
        subscription_id = %event.subscription_id().value(),
        "Domain event recorded"
    );
}

fn log_conflict(subscription_id: SubscriptionId, attempt: usize) {
    tracing::debug!(
        subscription_id = %subscription_id.value(),
        attempt,
        "Write precondition failed, reloading subscription"
    );
}

/// 明細から購読を作成する
///
/// ビジネスルール：
/// - 明細の元の注文が存在すること
/// - 注文に会員が紐付いていること（ゲスト注文からは作成できない）
/// - 初回処理日は同じ単位のピア購読と衝突しないこと
///
/// 明細ごとに順番に処理する。途中で失敗した場合はそこで終了し、
/// それまでに作成した購読は取り消さない。
///
/// # 一貫性保証
///
/// ピアの読み取りと保存の間に会員の購読が変化した場合、保存は拒否され、
/// ピアを読み直して再計算する（最大`MAX_WRITE_ATTEMPTS`回）。
///
/// # 戻り値
/// 作成された購読（保存後のバージョン）
pub async fn activate(
    deps: &ServiceDependencies,
    line_items: Vec<LineItem>,
    today: NaiveDate,
) -> Result<Vec<Subscription>> {
    let mut activated = Vec::with_capacity(line_items.len());

    for line_item in line_items {
        // 1. 元の注文を取得
        let order = deps
            .order_service
            .get_order(line_item.order_id)
            .await
            .map_err(SubscriptionApplicationError::OrderServiceError)?
            .ok_or(SubscriptionApplicationError::OrderNotFound)?;

        let subscription = activate_line_item(deps, line_item, order, today).await?;
        activated.push(subscription);
    }

    Ok(activated)
}

async fn activate_line_item(
    deps: &ServiceDependencies,
    line_item: LineItem,
    order: OrderDetails,
    today: NaiveDate,
) -> Result<Subscription> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        // 2. 会員の購読（ピア）を読み取る
        let peers = match order.user_id {
            Some(user_id) => load_peers(&deps.subscription_repository, user_id).await?,
            None => Vec::new(),
        };

        // 3. ドメイン層の純粋関数を呼び出し
        let (mut subscription, event) = domain::subscription::activate_subscription(
            order.user_id,
            line_item.clone(),
            order.ship_address.clone(),
            &peers,
            today,
            Utc::now(),
        )
        .map_err(|e| SubscriptionApplicationError::Validation(format!("{:?}", e)))?;

        // 4. ピアのスナップショットを前提条件として保存
        let snapshot = PeerSnapshot::capture(subscription.user_id, &peers);
        let inserted = deps
            .subscription_repository
            .insert(&subscription, &snapshot)
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if inserted {
            subscription.version += 1;
            log_event(&DomainEvent::SubscriptionActivated(event));
            return Ok(subscription);
        }
        log_conflict(subscription.subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 購読を解約する
///
/// ビジネスルール：
/// - ポリシーが即時解約を許せばcanceled、そうでなければpending_cancellation
/// - どちらの場合も処理日は消える
/// - 既に終端状態の購読には何もせず、現在の状態を返す
///
/// # 戻り値
/// 解約後（または既存）の状態
pub async fn cancel(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
    today: NaiveDate,
) -> Result<SubscriptionState> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        // 1. 現在の状態を読み直す
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;
        if subscription.state.is_terminal() {
            return Ok(subscription.state);
        }

        // 2. ポリシーで即時解約できるか判定
        let can_be_canceled = deps.policy.can_be_canceled(&subscription, today);

        // 3. ドメイン層の純粋関数を呼び出し
        let (canceled, event) =
            domain::subscription::cancel_subscription(subscription, can_be_canceled, Utc::now())
                .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;

        // 4. 保存
        let updated = deps
            .subscription_repository
            .update(&canceled, &Precondition::Row)
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            log_event(&DomainEvent::SubscriptionCanceled(event));
            return Ok(canceled.state);
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 購読を停止する
///
/// ビジネスルール：
/// - active状態であること
/// - ポリシーが停止を許すこと（既定：分割回数が上限に到達）
///
/// # 戻り値
/// 停止した場合は`true`。条件を満たさない場合は状態を変えずに`false`。
pub async fn deactivate(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
) -> Result<bool> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;
        if !subscription.is_active() || !deps.policy.can_be_deactivated(&subscription) {
            return Ok(false);
        }

        let (deactivated, event) =
            domain::subscription::deactivate_subscription(subscription, true, Utc::now())
                .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;

        let updated = deps
            .subscription_repository
            .update(&deactivated, &Precondition::Row)
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            log_event(&DomainEvent::SubscriptionDeactivated(event));
            return Ok(true);
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 処理日を次の周期へ進める
///
/// 保存済みの購読とピアを読み直してから再計算する。
/// ピアの読み取りと保存の一貫性はスナップショットで保証される。
///
/// # 戻り値
/// 新しい処理日。既にactiveでない場合は`None`（何もしない）。
pub async fn advance_actionable_date(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
) -> Result<Option<NaiveDate>> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;
        if !subscription.is_active() {
            return Ok(None);
        }

        let peers = load_peers(&deps.subscription_repository, subscription.user_id).await?;
        let snapshot = PeerSnapshot::capture(subscription.user_id, &peers);

        let (advanced, event) =
            domain::subscription::advance_actionable_date(subscription, &peers, Utc::now())
                .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;

        let updated = deps
            .subscription_repository
            .update(&advanced, &Precondition::Snapshot(snapshot))
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            let new_actionable_date = event.new_actionable_date;
            log_event(&DomainEvent::ActionableDateAdvanced(event));
            return Ok(Some(new_actionable_date));
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 処理した周期の分割回を記録する
///
/// ビジネスルール：
/// - `cycle_date`は購読の現在の処理日であること（別の日付なら処理済みとしてスキップ）
/// - 記録後に停止条件を満たせば停止、そうでなければ処理日を次の周期へ進める
/// - 分割回の追記と状態の更新は1回の保存で行う
/// - 周期の確保は記録と同時に外れる
pub async fn record_installment(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
    cycle_date: NaiveDate,
) -> Result<InstallmentOutcome> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;
        if subscription.actionable_date() != Some(cycle_date) {
            return Ok(InstallmentOutcome::Skipped);
        }

        let peers = load_peers(&deps.subscription_repository, subscription.user_id).await?;
        let snapshot = PeerSnapshot::capture(subscription.user_id, &peers);
        let now = Utc::now();

        let (recorded, recorded_event) =
            domain::subscription::record_installment(subscription, cycle_date, now)
                .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;

        let (next, next_event, outcome) = if deps.policy.can_be_deactivated(&recorded) {
            let (deactivated, event) =
                domain::subscription::deactivate_subscription(recorded, true, now)
                    .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;
            (
                deactivated,
                DomainEvent::SubscriptionDeactivated(event),
                InstallmentOutcome::Deactivated,
            )
        } else {
            let (advanced, event) =
                domain::subscription::advance_actionable_date(recorded, &peers, now)
                    .map_err(|e| SubscriptionApplicationError::DomainError(format!("{:?}", e)))?;
            let outcome = InstallmentOutcome::Advanced(event.new_actionable_date);
            (advanced, DomainEvent::ActionableDateAdvanced(event), outcome)
        };

        let updated = deps
            .subscription_repository
            .update(&next, &Precondition::Snapshot(snapshot))
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            log_event(&DomainEvent::InstallmentRecorded(recorded_event));
            log_event(&next_event);
            return Ok(outcome);
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 処理日の周期を確保する
///
/// 分割回を処理する前に呼び出し、同じ周期を複数の処理が同時に扱わないようにする。
/// 確保は行単位のバージョン検査付きで保存されるので、競合した処理のうち1つだけが成功する。
///
/// # 戻り値
/// 確保できた場合は保存後の購読。既に処理済み・前進済み・終端状態、
/// または他の処理が確保期限内の周期を保持している場合は`None`。
pub async fn claim_cycle(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
    cycle_date: NaiveDate,
) -> Result<Option<Subscription>> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;

        let (mut claimed, event) = match domain::subscription::claim_cycle(
            subscription,
            cycle_date,
            Duration::minutes(CYCLE_CLAIM_LEASE_MINUTES),
            Utc::now(),
        ) {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::debug!(
                    subscription_id = %subscription_id.value(),
                    %cycle_date,
                    reason = ?e,
                    "Cycle not claimable"
                );
                return Ok(None);
            }
        };

        let updated = deps
            .subscription_repository
            .update(&claimed, &Precondition::Row)
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            claimed.version += 1;
            log_event(&DomainEvent::CycleClaimed(event));
            return Ok(Some(claimed));
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 確保した周期を未処理のまま解放する
///
/// 処理日は変えないので、購読は次回のバッチで再び処理対象になる。
///
/// # 戻り値
/// 解放した場合は`true`。指定の周期が確保されていなければ`false`。
pub async fn release_cycle(
    deps: &ServiceDependencies,
    subscription_id: SubscriptionId,
    cycle_date: NaiveDate,
) -> Result<bool> {
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let subscription =
            load_subscription(&deps.subscription_repository, subscription_id).await?;

        let Ok((released, event)) =
            domain::subscription::release_cycle(subscription, cycle_date, Utc::now())
        else {
            return Ok(false);
        };

        let updated = deps
            .subscription_repository
            .update(&released, &Precondition::Row)
            .await
            .map_err(SubscriptionApplicationError::RepositoryError)?;

        if updated {
            log_event(&DomainEvent::CycleReleased(event));
            return Ok(true);
        }
        log_conflict(subscription_id, attempt);
    }

    Err(SubscriptionApplicationError::ConcurrentModification)
}

/// 処理対象の購読を取得する
///
/// active かつ 処理日 <= `as_of` の購読を、処理日・購読IDの順で返す。
pub async fn actionable(
    deps: &ServiceDependencies,
    as_of: NaiveDate,
) -> Result<Vec<Subscription>> {
    deps.subscription_repository
        .stream_actionable(as_of)
        .try_collect()
        .await
        .map_err(SubscriptionApplicationError::RepositoryError)
}
