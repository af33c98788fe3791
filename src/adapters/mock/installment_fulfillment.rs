use crate::domain::subscription::Subscription;
use crate::domain::value_objects::SubscriptionId;
use crate::ports::installment_fulfillment::{
    InstallmentFulfillment as InstallmentFulfillmentTrait, Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Mutex;

/// 分割回処理のモック実装
///
/// 実際の注文作成や決済は行わず、呼び出しを記録するだけ。
/// 失敗させたい購読を登録できる。
pub struct InstallmentFulfillment {
    fulfilled: Mutex<Vec<(SubscriptionId, NaiveDate)>>,
    failing: Mutex<HashSet<SubscriptionId>>,
}

impl InstallmentFulfillment {
    pub fn new() -> Self {
        Self {
            fulfilled: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// テスト用に処理を失敗させる購読を登録
    pub fn fail_for(&self, subscription_id: SubscriptionId) {
        self.failing.lock().unwrap().insert(subscription_id);
    }

    /// 処理に成功した呼び出しの一覧
    pub fn fulfilled(&self) -> Vec<(SubscriptionId, NaiveDate)> {
        self.fulfilled.lock().unwrap().clone()
    }
}

impl Default for InstallmentFulfillment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallmentFulfillmentTrait for InstallmentFulfillment {
    async fn fulfill(&self, subscription: &Subscription, cycle_date: NaiveDate) -> Result<()> {
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&subscription.subscription_id)
        {
            return Err(format!(
                "fulfillment rejected for subscription {}",
                subscription.subscription_id.value()
            )
            .into());
        }

        tracing::debug!(
            subscription_id = %subscription.subscription_id.value(),
            %cycle_date,
            "Mock fulfillment accepted installment"
        );
        self.fulfilled
            .lock()
            .unwrap()
            .push((subscription.subscription_id, cycle_date));
        Ok(())
    }
}
