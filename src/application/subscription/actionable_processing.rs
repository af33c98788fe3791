use chrono::NaiveDate;

use super::errors::{Result, SubscriptionApplicationError};
use super::subscription_service::{
    InstallmentOutcome, ServiceDependencies, actionable, claim_cycle, deactivate,
    record_installment, release_cycle,
};

/// 定期処理バッチの集計結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// 分割回を処理して次の処理日へ進めた件数
    pub processed: usize,
    /// 分割回数の上限に達して停止した件数
    pub deactivated: usize,
    /// 処理に失敗した件数（次回のバッチで再処理される）
    pub failed: usize,
    /// 読み直した時点で処理対象ではなくなっていた、または他の処理が確保していた件数
    pub skipped: usize,
}

/// 処理対象の購読を処理するバッチ（純粋な関数）
///
/// 定期的に実行され、処理日を迎えた購読の分割回を処理する。
///
/// ビジネスルール：
/// - active かつ 処理日 <= `today` の購読のみ処理する
/// - 既に分割回数の上限に達している購読は処理せずに停止する
/// - 周期を確保できた購読だけを処理する（同時に動くバッチ同士で二重に処理しない）
/// - 分割回の処理に失敗した購読は確保を解放し、次回のバッチで再処理する
///
/// 処理フロー：
/// 1. リポジトリから処理対象をすべて読み取る（処理中に接続を保持しない）
/// 2. 各購読について：
///    - 上限に達していれば停止して次へ
///    - 周期を確保（確保できなければスキップ）
///    - 分割回を処理（InstallmentFulfillment）
///    - 分割回を記録し、停止または処理日を前進
/// 3. 集計結果を返す
///
/// # エラー
/// 処理対象の読み取りに失敗した場合のみ。個々の購読の失敗は集計に含める。
pub async fn process_actionable_subscriptions(
    deps: &ServiceDependencies,
    today: NaiveDate,
) -> Result<ProcessingSummary> {
    let mut summary = ProcessingSummary::default();
    let candidates = actionable(deps, today).await?;

    for subscription in candidates {
        let subscription_id = subscription.subscription_id;

        // 2.1. 上限に達している購読は停止のみ
        if deps.policy.can_be_deactivated(&subscription) {
            match deactivate(deps, subscription_id).await {
                Ok(true) => summary.deactivated += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription_id.value(),
                        error = %e,
                        "Failed to deactivate subscription"
                    );
                    summary.failed += 1;
                }
            }
            continue;
        }

        let Some(cycle_date) = subscription.actionable_date() else {
            summary.skipped += 1;
            continue;
        };

        // 2.2. 周期を確保
        let claimed = match claim_cycle(deps, subscription_id, cycle_date).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription_id.value(),
                    %cycle_date,
                    error = %e,
                    "Failed to claim cycle"
                );
                summary.failed += 1;
                continue;
            }
        };

        // 2.3. 分割回を処理
        if let Err(e) = deps.fulfillment.fulfill(&claimed, cycle_date).await {
            let error = SubscriptionApplicationError::FulfillmentError(e);
            tracing::warn!(
                subscription_id = %subscription_id.value(),
                %cycle_date,
                error = ?error,
                "Installment fulfillment failed, will retry on next run"
            );
            if let Err(e) = release_cycle(deps, subscription_id, cycle_date).await {
                tracing::error!(
                    subscription_id = %subscription_id.value(),
                    %cycle_date,
                    error = %e,
                    "Failed to release cycle, it stays claimed until the lease expires"
                );
            }
            summary.failed += 1;
            continue;
        }

        // 2.4. 記録して停止または前進
        match record_installment(deps, subscription_id, cycle_date).await {
            Ok(InstallmentOutcome::Advanced(_)) => summary.processed += 1,
            Ok(InstallmentOutcome::Deactivated) => {
                summary.processed += 1;
                summary.deactivated += 1;
            }
            Ok(InstallmentOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription_id.value(),
                    %cycle_date,
                    error = %e,
                    "Failed to record installment"
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        %today,
        processed = summary.processed,
        deactivated = summary.deactivated,
        failed = summary.failed,
        skipped = summary.skipped,
        "Actionable subscriptions processed"
    );

    Ok(summary)
}
