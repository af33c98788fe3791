/// 購読作成のバリデーションエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionValidationError {
    /// 元の注文に会員が紐付いていない（ゲスト注文など）
    MissingUser,
    /// 初回の処理日が日付の表現範囲を超える
    DateOutOfRange,
}

/// 解約のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelSubscriptionError {
    /// 既に終端状態（canceled / pending_cancellation / inactive）
    AlreadyEnded,
}

/// 停止（inactive化）のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeactivateSubscriptionError {
    /// active以外の購読は停止できない
    NotActive,
    /// 分割回数が上限に達していない
    InstallmentLimitNotReached,
}

/// 処理日の前進のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceSubscriptionError {
    /// active以外の購読には次の処理日がない
    NotActive,
    /// 次の処理日が日付の表現範囲を超える
    DateOutOfRange,
}

/// 分割回の記録のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordInstallmentError {
    /// active以外の購読には記録できない
    NotActive,
    /// 分割回数の上限に既に達している
    InstallmentLimitReached,
}

/// 周期の確保のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimCycleError {
    /// active以外の購読には処理する周期がない
    NotActive,
    /// 処理日が指定の周期と一致しない（既に処理済み、または前進済み）
    NotDue,
    /// 他の処理が確保期限内の周期を保持している
    AlreadyClaimed,
}

/// 周期の解放のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseCycleError {
    /// 指定の周期は確保されていない
    NotClaimed,
}
