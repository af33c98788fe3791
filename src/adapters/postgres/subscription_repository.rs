use crate::domain::subscription::{
    CycleClaim, Installment, LineItem, Subscription, SubscriptionState,
};
use crate::domain::value_objects::{
    Interval, IntervalError, IntervalUnit, LineItemId, OrderId, ShippingAddress, SubscriptionId,
    UserId,
};
use crate::ports::subscription_repository::{
    PeerSnapshot, Precondition, Result, SubscriptionRepository as SubscriptionRepositoryTrait,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

/// 購読・明細・分割回をまとめて読み取るSELECT句
///
/// 分割回はJSON配列に集約し、1行で1つの購読を復元できるようにする。
const SELECT_SUBSCRIPTIONS: &str = r#"
    SELECT
        s.subscription_id,
        s.user_id,
        s.state,
        s.actionable_date,
        s.shipping_address,
        s.claimed_cycle_date,
        s.claimed_at,
        s.version,
        s.created_at,
        s.updated_at,
        li.line_item_id,
        li.order_id,
        li.interval_length,
        li.interval_units,
        li.start_date,
        li.max_installments,
        COALESCE(
            (
                SELECT json_agg(
                    json_build_object(
                        'installment_id', i.installment_id,
                        'cycle_date', i.cycle_date,
                        'created_at', i.created_at
                    )
                    ORDER BY i.created_at, i.installment_id
                )
                FROM subscription_installments i
                WHERE i.subscription_id = s.subscription_id
            ),
            '[]'::json
        ) AS installments
    FROM subscriptions s
    JOIN subscription_line_items li ON li.subscription_id = s.subscription_id
"#;

/// `stream_actionable`用のクエリ
///
/// ストリームが`'static`な文字列を借用できるよう、SELECT句を展開して保持する。
static ACTIONABLE_SQL: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    format!(
        "{} WHERE s.state = 'active' AND s.actionable_date <= $1 \
         ORDER BY s.actionable_date ASC, s.subscription_id ASC",
        SELECT_SUBSCRIPTIONS
    )
});

fn invalid_data(message: String) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| invalid_data(format!("{} out of range: {}", column, value)))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid_data(format!("{} out of range: {}", column, value)))
}

/// PostgreSQLの行データをSubscriptionに変換する
///
/// 状態と処理日の組み合わせ、間隔単位、数値の範囲を検証する。
fn map_row_to_subscription(row: &PgRow) -> Result<Subscription> {
    let state_str: &str = row.try_get("state")?;
    let actionable_date: Option<NaiveDate> = row.try_get("actionable_date")?;
    let state = SubscriptionState::from_parts(state_str, actionable_date).map_err(invalid_data)?;

    let unit: IntervalUnit = row
        .try_get::<&str, _>("interval_units")?
        .parse()
        .map_err(|e: IntervalError| invalid_data(e.to_string()))?;
    let length = to_u32(row.try_get("interval_length")?, "interval_length")?;
    let interval = Interval::new(length, unit).map_err(|e| invalid_data(e.to_string()))?;

    let max_installments = row
        .try_get::<Option<i32>, _>("max_installments")?
        .map(|max| to_u32(max, "max_installments"))
        .transpose()?;

    let shipping_address = row
        .try_get::<Option<serde_json::Value>, _>("shipping_address")?
        .map(serde_json::from_value::<ShippingAddress>)
        .transpose()?;

    let claim = match (
        row.try_get::<Option<NaiveDate>, _>("claimed_cycle_date")?,
        row.try_get::<Option<DateTime<Utc>>, _>("claimed_at")?,
    ) {
        (Some(cycle_date), Some(claimed_at)) => Some(CycleClaim {
            cycle_date,
            claimed_at,
        }),
        (None, None) => None,
        (cycle_date, claimed_at) => {
            return Err(invalid_data(format!(
                "Invalid cycle claim: claimed_cycle_date={:?}, claimed_at={:?}",
                cycle_date, claimed_at
            )));
        }
    };

    let installments: serde_json::Value = row.try_get("installments")?;
    let installments: Vec<Installment> = serde_json::from_value(installments)?;

    Ok(Subscription {
        subscription_id: SubscriptionId::from_uuid(row.try_get("subscription_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        line_item: LineItem {
            line_item_id: LineItemId::from_uuid(row.try_get("line_item_id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            interval,
            start_date: row.try_get("start_date")?,
            max_installments,
        },
        shipping_address,
        state,
        installments,
        claim,
        version: to_u32(row.try_get("version")?, "version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// 会員単位のトランザクションロックを取得する
///
/// 同じ会員の購読への書き込みを直列化する。トランザクション終了時に解放される。
async fn lock_user(conn: &mut PgConnection, user_id: UserId) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::uuid::text, 0))")
        .bind(user_id.value())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// 会員の購読の現在のバージョン集合を行ロック付きで読み取る
async fn current_versions(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Vec<(SubscriptionId, u32)>> {
    let rows: Vec<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT subscription_id, version
        FROM subscriptions
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id.value())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(id, version)| Ok((SubscriptionId::from_uuid(id), to_u32(version, "version")?)))
        .collect()
}

/// 未保存の分割回を追記する
///
/// 分割回は追記のみ。既存の行はON CONFLICTで無視され、変更されない。
async fn append_installments(
    conn: &mut PgConnection,
    subscription_id: SubscriptionId,
    installments: &[Installment],
) -> Result<()> {
    if installments.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = installments.iter().map(|i| i.installment_id.value()).collect();
    let cycle_dates: Vec<NaiveDate> = installments.iter().map(|i| i.cycle_date).collect();
    let created_at: Vec<DateTime<Utc>> = installments.iter().map(|i| i.created_at).collect();

    sqlx::query(
        r#"
        INSERT INTO subscription_installments (
            installment_id,
            subscription_id,
            cycle_date,
            created_at
        )
        SELECT installment_id, $1, cycle_date, created_at
        FROM UNNEST($2::uuid[], $3::date[], $4::timestamptz[])
            AS t(installment_id, cycle_date, created_at)
        ON CONFLICT (installment_id) DO NOTHING
        "#,
    )
    .bind(subscription_id.value())
    .bind(&ids)
    .bind(&cycle_dates)
    .bind(&created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// PostgreSQL implementation of SubscriptionRepository
///
/// Every write runs in a transaction that holds a per-user advisory lock,
/// so the precondition check and the write see the same state.
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    /// Create a new repository with a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepositoryTrait for SubscriptionRepository {
    async fn insert(&self, subscription: &Subscription, snapshot: &PeerSnapshot) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        lock_user(&mut tx, subscription.user_id).await?;
        let current = current_versions(&mut tx, subscription.user_id).await?;
        if snapshot.user_id() != subscription.user_id || !snapshot.matches(current) {
            tx.rollback().await?;
            return Ok(false);
        }

        let shipping_address = subscription
            .shipping_address
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                subscription_id,
                user_id,
                state,
                actionable_date,
                shipping_address,
                claimed_cycle_date,
                claimed_at,
                version,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(subscription.subscription_id.value())
        .bind(subscription.user_id.value())
        .bind(subscription.state.as_str())
        .bind(subscription.actionable_date())
        .bind(shipping_address)
        .bind(subscription.claim.map(|claim| claim.cycle_date))
        .bind(subscription.claim.map(|claim| claim.claimed_at))
        .bind(to_i32(subscription.version + 1, "version")?)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await?;

        let line_item = &subscription.line_item;
        sqlx::query(
            r#"
            INSERT INTO subscription_line_items (
                line_item_id,
                subscription_id,
                order_id,
                interval_length,
                interval_units,
                start_date,
                max_installments
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(line_item.line_item_id.value())
        .bind(subscription.subscription_id.value())
        .bind(line_item.order_id.value())
        .bind(to_i32(line_item.interval.length.value(), "interval_length")?)
        .bind(line_item.interval.unit.as_str())
        .bind(line_item.start_date)
        .bind(
            line_item
                .max_installments
                .map(|max| to_i32(max, "max_installments"))
                .transpose()?,
        )
        .execute(&mut *tx)
        .await?;

        append_installments(&mut tx, subscription.subscription_id, &subscription.installments)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update(
        &self,
        subscription: &Subscription,
        precondition: &Precondition,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        lock_user(&mut tx, subscription.user_id).await?;
        let current = current_versions(&mut tx, subscription.user_id).await?;
        let stored_version = current
            .iter()
            .find(|(id, _)| *id == subscription.subscription_id)
            .map(|(_, version)| *version);

        let satisfied = stored_version == Some(subscription.version)
            && match precondition {
                Precondition::Row => true,
                Precondition::Snapshot(snapshot) => {
                    snapshot.user_id() == subscription.user_id && snapshot.matches(current)
                }
            };

        if !satisfied {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET state = $2,
                actionable_date = $3,
                claimed_cycle_date = $4,
                claimed_at = $5,
                version = $6,
                updated_at = $7
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription.subscription_id.value())
        .bind(subscription.state.as_str())
        .bind(subscription.actionable_date())
        .bind(subscription.claim.map(|claim| claim.cycle_date))
        .bind(subscription.claim.map(|claim| claim.claimed_at))
        .bind(to_i32(subscription.version + 1, "version")?)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await?;

        append_installments(&mut tx, subscription.subscription_id, &subscription.installments)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_by_id(&self, subscription_id: SubscriptionId) -> Result<Option<Subscription>> {
        let sql = format!("{} WHERE s.subscription_id = $1", SELECT_SUBSCRIPTIONS);
        let row = sqlx::query(&sql)
            .bind(subscription_id.value())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row_to_subscription).transpose()
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Subscription>> {
        let sql = format!(
            "{} WHERE s.user_id = $1 ORDER BY s.created_at ASC, s.subscription_id ASC",
            SELECT_SUBSCRIPTIONS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.value())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row_to_subscription).collect()
    }

    /// Stream due subscriptions in (actionable_date, subscription_id) order
    ///
    /// Uses the partial index on active subscriptions.
    fn stream_actionable(&self, as_of: NaiveDate) -> BoxStream<'_, Result<Subscription>> {
        let stream = sqlx::query(ACTIONABLE_SQL.as_str())
            .bind(as_of)
            .fetch(&self.pool)
            .map(|row_result| {
                let row = row_result?;
                map_row_to_subscription(&row)
            });

        Box::pin(stream)
    }
}
