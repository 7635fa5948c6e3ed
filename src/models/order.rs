use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        OrderId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(ExecutionError::validation(format!("invalid side: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// 메이커 전용 지정가 (post-only)
    LimitMaker,
    StopLossLimit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::LimitMaker => "LIMIT_MAKER",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "LIMIT_MAKER" => Ok(OrderType::LimitMaker),
            "STOP_LOSS_LIMIT" => Ok(OrderType::StopLossLimit),
            other => Err(ExecutionError::exchange(format!("unknown order type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// 더 이상 상태가 변하지 않는 주문인지 여부
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl FromStr for OrderStatus {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" | "PENDING_NEW" | "PENDING_CANCEL" => Ok(OrderStatus::New),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
            other => Err(ExecutionError::exchange(format!("unknown order status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    #[serde(alias = "gtc")]
    Gtc,
    #[serde(alias = "ioc")]
    Ioc,
    #[serde(alias = "fok")]
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

impl FromStr for TimeInForce {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            "FOK" => Ok(TimeInForce::Fok),
            other => Err(ExecutionError::validation(format!("invalid time in force: {}", other))),
        }
    }
}

/// 거래소에 제출할 단일 주문 요청
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
    pub close_position: bool,
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, order_type: OrderType) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            side,
            order_type,
            quantity: None,
            price: None,
            stop_price: None,
            time_in_force: None,
            close_position: false,
            reduce_only: false,
            client_order_id: None,
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self::new(symbol, side, OrderType::Market).with_quantity(quantity)
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
    ) -> Self {
        Self::new(symbol, side, OrderType::Limit)
            .with_quantity(quantity)
            .with_price(price)
            .with_time_in_force(time_in_force)
    }

    /// 유동성을 가져가지 않는 지정가 주문
    pub fn limit_maker(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self::new(symbol, side, OrderType::LimitMaker)
            .with_quantity(quantity)
            .with_price(price)
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop_price(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }
}

/// 거래소가 보고한 주문 상태
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Option<f64>,
    pub executed_quantity: f64,
    pub cumulative_quote_quantity: f64,
}

impl OrderRecord {
    /// 평균 체결가 (체결 없으면 None)
    pub fn avg_fill_price(&self) -> Option<f64> {
        if self.executed_quantity > 0.0 {
            Some(self.cumulative_quote_quantity / self.executed_quantity)
        } else {
            None
        }
    }
}

/// 심볼별 수량/가격 단위 규칙
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub step_size: f64,
    pub tick_size: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SymbolInfo {
    pub fn new(symbol: impl Into<String>, step_size: f64, tick_size: f64) -> Self {
        SymbolInfo {
            symbol: symbol.into(),
            step_size,
            tick_size,
            min_price: None,
            max_price: None,
        }
    }

    pub fn with_price_bounds(mut self, min_price: f64, max_price: f64) -> Self {
        self.min_price = Some(min_price);
        self.max_price = Some(max_price);
        self
    }
}

/// OCO (지정가 익절 + 스탑 리밋 손절) 주문 요청
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub stop_price: f64,
    pub stop_limit_price: f64,
    pub stop_limit_time_in_force: TimeInForce,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcoReport {
    pub order_reports: Vec<OrderRecord>,
}
