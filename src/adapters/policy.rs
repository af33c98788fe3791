use crate::domain::subscription::Subscription;
use crate::ports::subscription_policy::SubscriptionPolicy;
use chrono::{Days, NaiveDate};

/// 既定の解約猶予（日数）
pub const DEFAULT_MINIMUM_CANCELLATION_NOTICE_DAYS: u32 = 1;

/// 既定の購読ポリシー
///
/// ビジネスルール：
/// - 処理日まで解約猶予日数より多く残っていれば即時解約できる
/// - 猶予期間内（処理がすでに始まっている可能性がある）の解約は解約待ちになる
/// - 停止判定はポートの既定（分割回数の上限到達）に従う
#[derive(Debug, Clone, Copy)]
pub struct DefaultSubscriptionPolicy {
    minimum_cancellation_notice_days: u32,
}

impl DefaultSubscriptionPolicy {
    pub fn new(minimum_cancellation_notice_days: u32) -> Self {
        Self {
            minimum_cancellation_notice_days,
        }
    }
}

impl Default for DefaultSubscriptionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_CANCELLATION_NOTICE_DAYS)
    }
}

impl SubscriptionPolicy for DefaultSubscriptionPolicy {
    fn can_be_canceled(&self, subscription: &Subscription, today: NaiveDate) -> bool {
        match subscription.actionable_date() {
            None => true,
            Some(actionable_date) => today
                .checked_add_days(Days::new(u64::from(self.minimum_cancellation_notice_days)))
                .is_some_and(|cutoff| actionable_date > cutoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::{SubscriptionState, test_support::*};
    use crate::domain::{IntervalUnit, UserId};

    #[test]
    fn test_can_cancel_outside_notice_window() {
        let policy = DefaultSubscriptionPolicy::new(1);
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Month, 1, date(2016, 10, 7));

        assert!(policy.can_be_canceled(&subscription, date(2016, 10, 5)));
    }

    #[test]
    fn test_cannot_cancel_inside_notice_window() {
        let policy = DefaultSubscriptionPolicy::new(1);
        let subscription =
            active_subscription(UserId::new(), IntervalUnit::Month, 1, date(2016, 10, 6));

        assert!(!policy.can_be_canceled(&subscription, date(2016, 10, 5)));
        assert!(!policy.can_be_canceled(&subscription, date(2016, 10, 6)));
    }

    #[test]
    fn test_can_cancel_without_actionable_date() {
        let policy = DefaultSubscriptionPolicy::default();
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Month, 1, date(2016, 10, 6));
        subscription.state = SubscriptionState::PendingCancellation;

        assert!(policy.can_be_canceled(&subscription, date(2016, 10, 5)));
    }

    #[test]
    fn test_default_deactivation_rule_uses_installment_limit() {
        let policy = DefaultSubscriptionPolicy::default();
        let mut subscription =
            active_subscription(UserId::new(), IntervalUnit::Week, 1, date(2016, 10, 6));
        subscription.line_item.max_installments = Some(2);

        subscription.installments = installments(1);
        assert!(!policy.can_be_deactivated(&subscription));

        subscription.installments = installments(2);
        assert!(policy.can_be_deactivated(&subscription));
    }
}
