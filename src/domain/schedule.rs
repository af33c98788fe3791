//! 処理日の計算（Interval Calculator）
//!
//! 同じ会員の、同じ間隔単位を持つ他の購読と同日に処理日が重ならないように
//! 次の処理日を決める。副作用を持たない純粋関数のみ。

use chrono::NaiveDate;

use super::subscription::{LineItem, Subscription};
use super::{Interval, IntervalUnit, SubscriptionId, UserId};

/// 基準日に最も近い同単位のピア購読を探す
///
/// 対象：
/// - 同じ会員の購読
/// - `exclude`以外（自分自身は除く）
/// - active状態（処理日を持つ）
/// - 明細の間隔単位が完全に一致する
///
/// 距離は処理日の差の絶対値（日数）。同距離の場合は基準日より未来のピアを優先し、
/// それでも決まらなければ購読IDの小さい方を選ぶ。
pub fn nearest_peer(
    anchor: NaiveDate,
    unit: IntervalUnit,
    user_id: UserId,
    exclude: Option<SubscriptionId>,
    peers: &[Subscription],
) -> Option<(&Subscription, NaiveDate)> {
    peers
        .iter()
        .filter(|peer| peer.user_id == user_id)
        .filter(|peer| Some(peer.subscription_id) != exclude)
        .filter(|peer| peer.line_item.interval.unit == unit)
        .filter_map(|peer| peer.actionable_date().map(|date| (peer, date)))
        .min_by_key(|(peer, date)| {
            (
                (*date - anchor).num_days().abs(),
                *date <= anchor,
                peer.subscription_id,
            )
        })
}

/// 基準日から次の処理日を計算する
///
/// 最も近いピアの処理日が基準日より厳密に後であれば、ピアの処理日から
/// 1周期後を返す。それ以外は基準日 + 1周期。
fn schedule_after(
    anchor: NaiveDate,
    interval: Interval,
    user_id: UserId,
    exclude: Option<SubscriptionId>,
    peers: &[Subscription],
) -> Option<NaiveDate> {
    match nearest_peer(anchor, interval.unit, user_id, exclude, peers) {
        Some((_, peer_date)) if peer_date > anchor => interval.add_to(peer_date),
        _ => interval.add_to(anchor),
    }
}

/// 純粋関数：購読の次の処理日
///
/// active以外の購読には次の処理日がないため`None`を返す。
/// 日付の表現範囲を超える場合も`None`。
pub fn next_actionable_date(
    subscription: &Subscription,
    peers: &[Subscription],
) -> Option<NaiveDate> {
    let current = subscription.actionable_date()?;
    schedule_after(
        current,
        subscription.line_item.interval,
        subscription.user_id,
        Some(subscription.subscription_id),
        peers,
    )
}

/// 純粋関数：新規購読の初回処理日
///
/// 作成前の購読には処理日がないので、明細の開始日（なければ当日）を基準日とし、
/// 通常と同じ規則で1周期後を求める。
pub fn first_actionable_date(
    line_item: &LineItem,
    user_id: UserId,
    today: NaiveDate,
    peers: &[Subscription],
) -> Option<NaiveDate> {
    let anchor = line_item.start_date.unwrap_or(today);
    schedule_after(anchor, line_item.interval, user_id, None, peers)
}
