use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 購読ID - 購読管理コンテキストの集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// 購読明細ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(Uuid);

impl LineItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LineItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// 会員ID - 顧客コンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

/// 注文ID - 注文コンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

/// 分割回（Installment）ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallmentId(Uuid);

impl InstallmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for InstallmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// 間隔のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// 間隔の長さが0
    ZeroLength,
    /// 未知の間隔単位
    InvalidUnit(String),
}

impl std::fmt::Display for IntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalError::ZeroLength => write!(f, "interval length must be positive"),
            IntervalError::InvalidUnit(unit) => write!(f, "invalid interval unit: {}", unit),
        }
    }
}

impl std::error::Error for IntervalError {}

/// 間隔の単位
///
/// 閉じた列挙型。未知の単位は既定値に丸めず、構築時にエラーとする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

impl std::str::FromStr for IntervalUnit {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "days" => Ok(IntervalUnit::Day),
            "week" | "weeks" => Ok(IntervalUnit::Week),
            "month" | "months" => Ok(IntervalUnit::Month),
            "year" | "years" => Ok(IntervalUnit::Year),
            _ => Err(IntervalError::InvalidUnit(s.to_string())),
        }
    }
}

/// 間隔の長さ
///
/// 不変条件：1以上。0を持つ値は作成できない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct IntervalLength(u32);

impl IntervalLength {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for IntervalLength {
    type Error = IntervalError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(IntervalError::ZeroLength);
        }
        Ok(Self(value))
    }
}

impl From<IntervalLength> for u32 {
    fn from(length: IntervalLength) -> Self {
        length.0
    }
}

/// 購読の周期（例: 2週間ごと）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub length: IntervalLength,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn new(length: u32, unit: IntervalUnit) -> Result<Self, IntervalError> {
        Ok(Self {
            length: IntervalLength::try_from(length)?,
            unit,
        })
    }

    /// 日付に周期を1回分加算する
    ///
    /// 月・年はカレンダー演算（月末は丸められる。1/31 + 1か月 = 2/28 or 2/29）。
    /// 日付の表現範囲を超えた場合は`None`。
    pub fn add_to(&self, date: NaiveDate) -> Option<NaiveDate> {
        let n = self.length.value();
        match self.unit {
            IntervalUnit::Day => date.checked_add_days(Days::new(u64::from(n))),
            IntervalUnit::Week => date.checked_add_days(Days::new(u64::from(n) * 7)),
            IntervalUnit::Month => date.checked_add_months(Months::new(n)),
            IntervalUnit::Year => date.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

/// 配送先住所
///
/// 購読作成時に元の注文からコピーされる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub zipcode: String,
    pub country_code: String,
    pub phone: Option<String>,
}
