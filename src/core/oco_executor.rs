/**
* filename : oco_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 지정가 익절 + 스탑 리밋 손절 OCO 주문 실행
**/

use async_trait::async_trait;

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState, ExecutionStatus};
use crate::models::order::{OcoRequest, OrderSide, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{require_positive, BasicRequestValidator, RequestValidator};
use crate::utils::logging;

/// OCO 옵션
#[derive(Debug, Clone)]
pub struct OcoParams {
  /// 손절 발동가
  pub stop_price: f64,
  /// 손절 지정가
  pub stop_limit_price: f64,
  pub stop_limit_time_in_force: TimeInForce,
}

impl OcoParams {
  pub fn new(stop_price: f64, stop_limit_price: f64) -> Self {
    OcoParams {
      stop_price,
      stop_limit_price,
      stop_limit_time_in_force: TimeInForce::Gtc,
    }
  }

  /// 발동가는 익절가의 반대편에 있어야 한다
  pub fn validate(&self, side: OrderSide, price: f64) -> Result<(), ExecutionError> {
    require_positive("stop_price", self.stop_price)?;
    require_positive("stop_limit_price", self.stop_limit_price)?;

    let ordered = match side {
      OrderSide::Sell => self.stop_price < price,
      OrderSide::Buy => self.stop_price > price,
    };
    if !ordered {
      return Err(ExecutionError::validation(format!(
        "{} OCO stop price {} is on the wrong side of limit price {}",
        side, self.stop_price, price
      )));
    }
    Ok(())
  }
}

pub struct OcoOrderExecutor {
  ctx: ExecutionContext,
  request: ExecutionRequest,
  params: OcoParams,
  state: ExecutionState,
}

impl OcoOrderExecutor {
  pub fn new(
    exchange: SharedExchange,
    request: ExecutionRequest,
    params: OcoParams,
    settings: ExecutionSettings,
  ) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Oco,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    OcoOrderExecutor {
      ctx: ExecutionContext::new(exchange, settings),
      request,
      params,
      state,
    }
  }

  fn validate(&self) -> Result<(), ExecutionError> {
    BasicRequestValidator::with_price().validate(&self.request)?;
    let price = self
      .request
      .price
      .ok_or_else(|| ExecutionError::validation("price is required"))?;
    self.params.validate(self.request.side, price)
  }

  async fn run(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();
    let price = self
      .request
      .price
      .ok_or_else(|| ExecutionError::validation("price is required"))?;

    let quantity = self.ctx.quantizer.quantize_quantity(&symbol, self.request.quantity).await;
    if quantity <= 0.0 {
      return Err(ExecutionError::validation(format!(
        "quantity {} is below the step size of {}",
        self.request.quantity, symbol
      )));
    }

    let oco = OcoRequest {
      symbol: symbol.clone(),
      side: self.request.side,
      quantity,
      price: self.ctx.quantizer.quantize_price(&symbol, price).await,
      stop_price: self.ctx.quantizer.quantize_price(&symbol, self.params.stop_price).await,
      stop_limit_price: self.ctx.quantizer.quantize_price(&symbol, self.params.stop_limit_price).await,
      stop_limit_time_in_force: self.params.stop_limit_time_in_force,
    };

    let report = {
      let mut exchange = self.ctx.exchange.write().await;
      exchange.create_oco_order(oco).await?
    };

    // 양쪽 체결을 하나의 집계로 합산
    for leg in &report.order_reports {
      logging::log_order_submitted(leg, quantity, leg.price);
      self.state.add_child(leg, quantity, leg.price);
    }

    let all_done = !self.state.children.is_empty() && self.state.children.iter().all(|c| c.status.is_terminal());
    if self.state.filled_quantity >= quantity {
      self.state.set_status(ExecutionStatus::Completed);
    } else if all_done {
      self.state.settle();
    } else {
      log::info!("OCO 대기 중: {} - 체결 {}/{}", symbol, self.state.filled_quantity, quantity);
    }
    Ok(())
  }
}

#[async_trait]
impl Executor for OcoOrderExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Oco
  }

  async fn execute(&mut self) -> ExecutionState {
    if !ensure_first_run(&self.state) {
      return self.state.clone();
    }

    let validated = self.validate();
    if validated.is_err() {
      return finish(&mut self.state, validated);
    }

    self.state.begin();
    logging::log_execution_start(&self.state);
    let result = self.run().await;
    finish(&mut self.state, result)
  }

  fn state(&self) -> ExecutionState {
    self.state.clone()
  }

  async fn cancel_all(&mut self) -> ExecutionState {
    self.ctx.cancel_all(&mut self.state).await;
    self.state.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exchange::mocks::{LimitFill, MockExchange};
  use crate::models::order::{OrderStatus, OrderType};
  use std::sync::Arc;
  use tokio::sync::RwLock;

  #[tokio::test]
  async fn test_filled_take_profit_completes() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Sell, 0.5).with_price(52000.0);
    let mut executor = OcoOrderExecutor::new(
      exchange.clone(),
      request,
      OcoParams::new(48000.0, 47900.0),
      ExecutionSettings::default(),
    );

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.children.len(), 2);
    assert_eq!(state.children[0].order_type, OrderType::LimitMaker);
    assert_eq!(state.children[1].status, OrderStatus::Expired);
    assert_eq!(state.filled_quantity, 0.5);
    assert_eq!(state.avg_price, 52000.0);
  }

  #[tokio::test]
  async fn test_resting_legs_stay_pending() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Sell, 0.5).with_price(52000.0);
    let mut executor = OcoOrderExecutor::new(
      exchange.clone(),
      request,
      OcoParams::new(48000.0, 47900.0),
      ExecutionSettings::default(),
    );

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Pending);

    let state = executor.cancel_all().await;
    assert_eq!(state.status, ExecutionStatus::Canceled);
    assert_eq!(exchange.read().await.cancel_requests().len(), 2);
  }

  #[tokio::test]
  async fn test_stop_on_wrong_side_is_rejected() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 0.5).with_price(48000.0);
    let mut executor = OcoOrderExecutor::new(
      exchange.clone(),
      request,
      OcoParams::new(47000.0, 47100.0),
      ExecutionSettings::default(),
    );

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Error);
    assert!(exchange.read().await.submissions().is_empty());
  }

  #[tokio::test]
  async fn test_exchange_rejection_is_terminal() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.reject_submission(0);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Sell, 0.5).with_price(52000.0);
    let mut executor = OcoOrderExecutor::new(
      exchange.clone(),
      request,
      OcoParams::new(48000.0, 47900.0),
      ExecutionSettings::default(),
    );

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Error);
    assert!(state.children.is_empty());
  }
}
