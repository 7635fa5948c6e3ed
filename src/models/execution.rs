//! 실행 상태 모델
//!
//! 하나의 실행 요청에 대한 집계 상태와 하위 주문 기록

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExecutionError;
use crate::models::order::{OrderId, OrderRecord, OrderSide, OrderStatus, OrderType};

/// 실행 알고리즘 종류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionAlgorithm {
    Market,
    Limit,
    Iceberg,
    Twap,
    Scaled,
    Oco,
}

impl ExecutionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionAlgorithm::Market => "market",
            ExecutionAlgorithm::Limit => "limit",
            ExecutionAlgorithm::Iceberg => "iceberg",
            ExecutionAlgorithm::Twap => "twap",
            ExecutionAlgorithm::Scaled => "scaled",
            ExecutionAlgorithm::Oco => "oco",
        }
    }
}

impl fmt::Display for ExecutionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionAlgorithm {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market" => Ok(ExecutionAlgorithm::Market),
            "limit" => Ok(ExecutionAlgorithm::Limit),
            "iceberg" => Ok(ExecutionAlgorithm::Iceberg),
            "twap" => Ok(ExecutionAlgorithm::Twap),
            "scaled" => Ok(ExecutionAlgorithm::Scaled),
            "oco" => Ok(ExecutionAlgorithm::Oco),
            other => Err(ExecutionError::validation(format!("unknown execution algorithm: {}", other))),
        }
    }
}

/// 집계 실행 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Initialized,
    Pending,
    PartiallyFilled,
    Completed,
    Canceled,
    Error,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Canceled
                | ExecutionStatus::Error
                | ExecutionStatus::Timeout
        )
    }

    fn rank(&self) -> u8 {
        match self {
            ExecutionStatus::Initialized => 0,
            ExecutionStatus::Pending => 1,
            ExecutionStatus::PartiallyFilled => 2,
            _ => 3,
        }
    }

    /// 진행 방향으로만 전이 허용. 종료 상태 사이에서는 timeout -> canceled 만 허용
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return *self == ExecutionStatus::Timeout && next == ExecutionStatus::Canceled;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Initialized => "initialized",
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::PartiallyFilled => "partially_filled",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Canceled => "canceled",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거래소에 실제로 제출된 하위 주문
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildOrder {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub requested_quantity: f64,
    pub requested_price: Option<f64>,
    pub status: OrderStatus,
    pub executed_quantity: f64,
    pub executed_notional: f64,
}

impl ChildOrder {
    fn apply(&mut self, record: &OrderRecord) {
        self.status = record.status;

        let reported = record.executed_quantity.max(0.0);
        if self.requested_quantity > 0.0 && reported > self.requested_quantity {
            // 요청 수량을 넘는 보고는 잘라내고 체결 금액도 비례 조정
            let ratio = self.requested_quantity / reported;
            self.executed_quantity = self.requested_quantity;
            self.executed_notional = record.cumulative_quote_quantity * ratio;
        } else {
            self.executed_quantity = reported;
            self.executed_notional = record.cumulative_quote_quantity.max(0.0);
        }
    }
}

/// 실행 집계 상태 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionState {
    pub algorithm: ExecutionAlgorithm,
    pub symbol: String,
    pub side: OrderSide,
    pub requested_quantity: f64,
    pub reference_price: Option<f64>,
    pub filled_quantity: f64,
    pub avg_price: f64,
    pub total_cost: f64,
    /// 기준가 대비 평균 체결가 편차 (%), 양수면 불리한 체결
    pub slippage: f64,
    pub status: ExecutionStatus,
    pub children: Vec<ChildOrder>,
    pub error: Option<String>,
    pub slice_errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new(
        algorithm: ExecutionAlgorithm,
        symbol: impl Into<String>,
        side: OrderSide,
        requested_quantity: f64,
        reference_price: Option<f64>,
    ) -> Self {
        ExecutionState {
            algorithm,
            symbol: symbol.into(),
            side,
            requested_quantity,
            reference_price,
            filled_quantity: 0.0,
            avg_price: 0.0,
            total_cost: 0.0,
            slippage: 0.0,
            status: ExecutionStatus::Initialized,
            children: Vec::new(),
            error: None,
            slice_errors: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// 상태 전이. 허용되지 않는 전이는 무시하고 false 반환
    pub fn set_status(&mut self, next: ExecutionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition_to(next) {
            log::debug!(
                "{} {}: status transition {} -> {} ignored",
                self.algorithm, self.symbol, self.status, next
            );
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn begin(&mut self) {
        self.started_at = Some(Utc::now());
        self.set_status(ExecutionStatus::Pending);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.set_status(ExecutionStatus::Error) {
            self.error = Some(message);
        }
    }

    pub fn record_slice_error(&mut self, message: impl Into<String>) {
        self.slice_errors.push(message.into());
    }

    pub fn set_reference_price(&mut self, price: f64) {
        if self.reference_price.is_none() && price > 0.0 {
            self.reference_price = Some(price);
            self.recompute();
        }
    }

    /// 제출된 주문을 하위 주문으로 등록
    pub fn add_child(&mut self, record: &OrderRecord, requested_quantity: f64, requested_price: Option<f64>) {
        let mut child = ChildOrder {
            order_id: record.order_id.clone(),
            order_type: record.order_type,
            requested_quantity,
            requested_price,
            status: record.status,
            executed_quantity: 0.0,
            executed_notional: 0.0,
        };
        child.apply(record);
        self.children.push(child);
        self.recompute();
    }

    /// 거래소 조회 결과 반영. 추적 중인 주문이 아니면 false
    pub fn apply_update(&mut self, record: &OrderRecord) -> bool {
        let Some(child) = self.children.iter_mut().find(|c| c.order_id == record.order_id) else {
            return false;
        };
        child.apply(record);
        self.recompute();
        true
    }

    pub fn child(&self, order_id: &OrderId) -> Option<&ChildOrder> {
        self.children.iter().find(|c| &c.order_id == order_id)
    }

    pub fn open_children(&self) -> Vec<OrderId> {
        self.children
            .iter()
            .filter(|c| c.status.is_open())
            .map(|c| c.order_id.clone())
            .collect()
    }

    /// 하위 주문 체결 합계로 집계값 재계산
    fn recompute(&mut self) {
        let filled: f64 = self.children.iter().map(|c| c.executed_quantity).sum();
        let notional: f64 = self.children.iter().map(|c| c.executed_notional).sum();

        self.filled_quantity = filled;
        if filled > 0.0 {
            self.avg_price = notional / filled;
            self.total_cost = self.avg_price * filled;
        } else {
            self.avg_price = 0.0;
            self.total_cost = 0.0;
        }

        self.slippage = match self.reference_price {
            Some(reference) if reference > 0.0 && filled > 0.0 => match self.side {
                OrderSide::Buy => (self.avg_price - reference) / reference * 100.0,
                OrderSide::Sell => (reference - self.avg_price) / reference * 100.0,
            },
            _ => 0.0,
        };

        if filled > 0.0 && self.status == ExecutionStatus::Pending {
            self.set_status(ExecutionStatus::PartiallyFilled);
        }
    }

    /// 요청 수량 전체 체결 여부. 수량 단위 반올림으로 남는 자투리는 모든 하위 주문이 체결됐으면 완료로 본다
    pub fn is_fully_filled(&self) -> bool {
        if self.requested_quantity > 0.0 && self.filled_quantity >= self.requested_quantity * (1.0 - 1e-9) {
            return true;
        }
        !self.children.is_empty()
            && self.slice_errors.is_empty()
            && self.children.iter().all(|c| c.status == OrderStatus::Filled)
    }

    /// 모든 하위 주문이 종료된 뒤의 최종 상태 결정
    pub fn settle(&mut self) {
        let next = if self.is_fully_filled() {
            ExecutionStatus::Completed
        } else if self.filled_quantity > 0.0 {
            ExecutionStatus::PartiallyFilled
        } else if !self.children.is_empty()
            && self.children.iter().all(|c| c.status == OrderStatus::Rejected)
        {
            self.error = Some("all child orders were rejected".to_string());
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Canceled
        };
        self.set_status(next);
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: OrderStatus, qty: f64, quote: f64) -> OrderRecord {
        OrderRecord {
            order_id: OrderId(id.to_string()),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            status,
            price: Some(100.0),
            executed_quantity: qty,
            cumulative_quote_quantity: quote,
        }
    }

    #[test]
    fn test_fill_aggregation() {
        let mut state = ExecutionState::new(ExecutionAlgorithm::Iceberg, "BTCUSDT", OrderSide::Buy, 2.0, Some(100.0));
        state.begin();
        state.add_child(&record("1", OrderStatus::New, 0.0, 0.0), 1.0, Some(100.0));
        state.add_child(&record("2", OrderStatus::New, 0.0, 0.0), 1.0, Some(102.0));
        assert_eq!(state.status, ExecutionStatus::Pending);
        assert_eq!(state.avg_price, 0.0);

        state.apply_update(&record("1", OrderStatus::Filled, 1.0, 100.0));
        state.apply_update(&record("2", OrderStatus::PartiallyFilled, 0.5, 51.0));

        let sum: f64 = state.children.iter().map(|c| c.executed_quantity).sum();
        assert_eq!(state.filled_quantity, sum);
        assert_eq!(state.filled_quantity, 1.5);
        assert!((state.avg_price - 151.0 / 1.5).abs() < 1e-9);
        assert!((state.total_cost - 151.0).abs() < 1e-9);
        // 매수: 평균가가 기준가보다 높으면 양수
        assert!(state.slippage > 0.0);
        assert_eq!(state.status, ExecutionStatus::PartiallyFilled);
    }

    #[test]
    fn test_sell_slippage_sign() {
        let mut state = ExecutionState::new(ExecutionAlgorithm::Market, "BTCUSDT", OrderSide::Sell, 1.0, Some(100.0));
        state.begin();
        state.add_child(&record("1", OrderStatus::Filled, 1.0, 99.0), 1.0, None);
        assert!((state.slippage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_over_reported_fill_is_capped() {
        let mut state = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, None);
        state.begin();
        state.add_child(&record("1", OrderStatus::Filled, 1.5, 150.0), 1.0, Some(100.0));
        assert_eq!(state.filled_quantity, 1.0);
        assert!((state.avg_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut state = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, None);
        state.begin();
        assert!(state.set_status(ExecutionStatus::PartiallyFilled));
        assert!(!state.set_status(ExecutionStatus::Pending));

        assert!(state.set_status(ExecutionStatus::Completed));
        assert!(!state.set_status(ExecutionStatus::PartiallyFilled));
        assert!(!state.set_status(ExecutionStatus::Pending));
        assert!(!state.set_status(ExecutionStatus::Canceled));
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_timeout_can_be_canceled() {
        let mut state = ExecutionState::new(ExecutionAlgorithm::Scaled, "BTCUSDT", OrderSide::Buy, 1.0, None);
        state.begin();
        assert!(state.set_status(ExecutionStatus::Timeout));
        assert!(state.set_status(ExecutionStatus::Canceled));
        assert!(!state.set_status(ExecutionStatus::Timeout));
    }

    #[test]
    fn test_settle_outcomes() {
        let mut rejected = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, None);
        rejected.begin();
        rejected.add_child(&record("1", OrderStatus::Rejected, 0.0, 0.0), 1.0, Some(100.0));
        rejected.settle();
        assert_eq!(rejected.status, ExecutionStatus::Error);

        let mut expired = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, None);
        expired.begin();
        expired.add_child(&record("1", OrderStatus::Expired, 0.0, 0.0), 1.0, Some(100.0));
        expired.settle();
        assert_eq!(expired.status, ExecutionStatus::Canceled);

        // 단위 반올림으로 0.999 만 제출된 경우도 전부 체결되면 완료
        let mut rounded = ExecutionState::new(ExecutionAlgorithm::Iceberg, "BTCUSDT", OrderSide::Buy, 1.0005, None);
        rounded.begin();
        rounded.add_child(&record("1", OrderStatus::Filled, 1.0, 100.0), 1.0, Some(100.0));
        rounded.settle();
        assert_eq!(rounded.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("TWAP".parse::<ExecutionAlgorithm>().unwrap(), ExecutionAlgorithm::Twap);
        assert_eq!(" oco ".parse::<ExecutionAlgorithm>().unwrap(), ExecutionAlgorithm::Oco);
        assert!("vwap".parse::<ExecutionAlgorithm>().is_err());
    }
}
