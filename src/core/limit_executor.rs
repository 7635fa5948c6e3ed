/**
* filename : limit_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 지정가 단일 주문 실행 및 체결 감시
**/

use async_trait::async_trait;
use tokio::time::Duration;

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState};
use crate::models::order::{OrderRequest, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{BasicRequestValidator, RequestValidator};
use crate::utils::logging;

/// 지정가 주문 옵션
#[derive(Debug, Clone, Default)]
pub struct LimitParams {
  pub time_in_force: TimeInForce,
  /// 메이커 전용 (LIMIT_MAKER) 주문 여부
  pub post_only: bool,
  /// 감시 타임아웃. None 이면 설정 기본값
  pub timeout: Option<Duration>,
}

pub struct LimitOrderExecutor {
  ctx: ExecutionContext,
  request: ExecutionRequest,
  params: LimitParams,
  state: ExecutionState,
}

impl LimitOrderExecutor {
  pub fn new(
    exchange: SharedExchange,
    request: ExecutionRequest,
    params: LimitParams,
    settings: ExecutionSettings,
  ) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Limit,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    LimitOrderExecutor {
      ctx: ExecutionContext::new(exchange, settings),
      request,
      params,
      state,
    }
  }

  async fn run(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();
    let raw_price = self
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
    let price = self.ctx.quantizer.quantize_price(&symbol, raw_price).await;

    let order = if self.params.post_only {
      OrderRequest::limit_maker(&symbol, self.request.side, quantity, price)
    } else {
      OrderRequest::limit(&symbol, self.request.side, quantity, price, self.params.time_in_force)
    };
    self.ctx.submit(&mut self.state, order).await?;

    let timeout = self.params.timeout.unwrap_or_else(|| self.ctx.settings.default_timeout());
    let tracked = self.state.open_children();
    let outcome = self.ctx.monitor.wait(&mut self.state, tracked, timeout, None).await;
    outcome.apply(&mut self.state);
    Ok(())
  }
}

#[async_trait]
impl Executor for LimitOrderExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Limit
  }

  async fn execute(&mut self) -> ExecutionState {
    if !ensure_first_run(&self.state) {
      return self.state.clone();
    }

    let validated = BasicRequestValidator::with_price().validate(&self.request);
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
  use crate::models::execution::ExecutionStatus;
  use crate::models::order::{OrderSide, OrderType};
  use std::sync::Arc;
  use tokio::sync::RwLock;

  fn settings() -> ExecutionSettings {
    ExecutionSettings {
      poll_interval_ms: 1000,
      market_recheck_delay_ms: 10,
      submission_delay_ms: 0,
      default_timeout_secs: 30,
    }
  }

  #[tokio::test]
  async fn test_limit_fill_completes_with_price_improvement() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 0.25).with_price(49000.004);
    let mut executor = LimitOrderExecutor::new(exchange.clone(), request, LimitParams::default(), settings());

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.children[0].requested_price, Some(49000.0));
    assert_eq!(state.avg_price, 49000.0);
    assert!(state.slippage < 0.0);
  }

  #[tokio::test]
  async fn test_post_only_uses_limit_maker() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Sell, 0.1).with_price(51000.0);
    let params = LimitParams { post_only: true, ..LimitParams::default() };
    let mut executor = LimitOrderExecutor::new(exchange.clone(), request, params, settings());

    executor.execute().await;

    let mock = exchange.read().await;
    assert_eq!(mock.submissions()[0].request.order_type, OrderType::LimitMaker);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unfilled_limit_times_out_without_cancel() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 1.0).with_price(45000.0);
    let params = LimitParams { timeout: Some(Duration::from_secs(5)), ..LimitParams::default() };
    let mut executor = LimitOrderExecutor::new(exchange.clone(), request, params, settings());

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Timeout);
    assert!(exchange.read().await.cancel_requests().is_empty());

    // 타임아웃 이후 호출자가 직접 취소
    let state = executor.cancel_all().await;
    assert_eq!(state.status, ExecutionStatus::Canceled);
    assert_eq!(exchange.read().await.cancel_requests().len(), 1);
  }

  #[tokio::test]
  async fn test_ioc_without_liquidity_is_canceled() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 1.0).with_price(45000.0);
    let params = LimitParams { time_in_force: TimeInForce::Ioc, ..LimitParams::default() };
    let mut executor = LimitOrderExecutor::new(exchange.clone(), request, params, settings());

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Canceled);
    assert_eq!(state.filled_quantity, 0.0);
  }

  #[tokio::test]
  async fn test_missing_price_is_validation_error() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 1.0);
    let mut executor = LimitOrderExecutor::new(exchange.clone(), request, LimitParams::default(), settings());

    let state = executor.execute().await;
    assert_eq!(state.status, ExecutionStatus::Error);
    assert!(state.children.is_empty());
    assert!(exchange.read().await.submissions().is_empty());
  }
}
