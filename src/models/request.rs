use serde::{Deserialize, Serialize};

use crate::models::order::OrderSide;

/// 호출자가 한 번 만들고 변경하지 않는 실행 요청
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// 기준가 (지정가 계열 알고리즘에서는 필수)
    pub price: Option<f64>,
}

impl ExecutionRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        ExecutionRequest {
            symbol: symbol.into(),
            side,
            quantity,
            price: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}
