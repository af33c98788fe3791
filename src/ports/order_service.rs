use crate::domain::value_objects::{OrderId, ShippingAddress, UserId};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 注文の詳細（購読作成に必要な部分のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub order_id: OrderId,
    /// ゲスト注文の場合は`None`
    pub user_id: Option<UserId>,
    pub ship_address: Option<ShippingAddress>,
}

/// 注文サービスポート
///
/// 購読コンテキストと注文コンテキストの境界を維持する。
/// 購読コンテキストはOrderIDと、会員・配送先だけを知る。
#[async_trait]
pub trait OrderService: Send + Sync {
    /// 注文を取得する
    ///
    /// 明細の有効化時に会員と配送先住所を得るために使用される。
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderDetails>>;
}
