/**
* filename : market_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 시장가 단일 주문 실행
**/

use async_trait::async_trait;
use tokio::time::sleep;

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState, ExecutionStatus};
use crate::models::order::{OrderRequest, OrderStatus};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{BasicRequestValidator, RequestValidator};
use crate::utils::logging;

/// 전체 수량을 시장가 주문 한 건으로 실행
pub struct MarketOrderExecutor {
  ctx: ExecutionContext,
  request: ExecutionRequest,
  state: ExecutionState,
}

impl MarketOrderExecutor {
  pub fn new(exchange: SharedExchange, request: ExecutionRequest, settings: ExecutionSettings) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Market,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    MarketOrderExecutor {
      ctx: ExecutionContext::new(exchange, settings),
      request,
      state,
    }
  }

  async fn run(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();

    if self.state.reference_price.is_none() {
      if let Some(price) = self.ctx.last_price(&symbol).await {
        self.state.set_reference_price(price);
      }
    }

    let quantity = self.ctx.quantizer.quantize_quantity(&symbol, self.request.quantity).await;
    if quantity <= 0.0 {
      return Err(ExecutionError::validation(format!(
        "quantity {} is below the step size of {}",
        self.request.quantity, symbol
      )));
    }

    let order = OrderRequest::market(&symbol, self.request.side, quantity);
    let record = self.ctx.submit(&mut self.state, order).await?;

    // 미체결 응답이면 한 번만 재확인
    if record.status.is_open() {
      sleep(self.ctx.settings.market_recheck_delay()).await;
      let mut tracked = vec![record.order_id.clone()];
      self.ctx.monitor.poll_once(&mut self.state, &mut tracked).await;
    }

    let Some(child) = self.state.child(&record.order_id).cloned() else {
      return Ok(());
    };

    if child.status == OrderStatus::Rejected {
      return Err(ExecutionError::exchange(format!("market order {} rejected", child.order_id)));
    }

    let next = if child.executed_quantity >= child.requested_quantity {
      ExecutionStatus::Completed
    } else if child.executed_quantity <= 0.0 && child.status.is_terminal() {
      ExecutionStatus::Canceled
    } else {
      ExecutionStatus::PartiallyFilled
    };
    self.state.set_status(next);
    Ok(())
  }
}

#[async_trait]
impl Executor for MarketOrderExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Market
  }

  async fn execute(&mut self) -> ExecutionState {
    if !ensure_first_run(&self.state) {
      return self.state.clone();
    }

    let validated = BasicRequestValidator::without_price().validate(&self.request);
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
  use crate::exchange::mocks::MockExchange;
  use crate::models::order::OrderSide;
  use std::sync::Arc;
  use tokio::sync::RwLock;

  fn settings() -> ExecutionSettings {
    ExecutionSettings {
      poll_interval_ms: 10,
      market_recheck_delay_ms: 10,
      submission_delay_ms: 0,
      default_timeout_secs: 1,
    }
  }

  #[tokio::test]
  async fn test_market_order_completes() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 0.5);
    let mut executor = MarketOrderExecutor::new(exchange.clone(), request, settings());

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.children.len(), 1);
    assert_eq!(state.filled_quantity, 0.5);
    assert_eq!(state.avg_price, 50000.0);
    assert_eq!(state.reference_price, Some(50000.0));
    assert_eq!(state.slippage, 0.0);
  }

  #[tokio::test]
  async fn test_market_order_rechecks_once() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_delayed_market_fill(true);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Sell, 1.0);
    let mut executor = MarketOrderExecutor::new(exchange.clone(), request, settings());

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.filled_quantity, 1.0);
  }

  #[tokio::test]
  async fn test_rejection_is_terminal_error() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.reject_submission(0);
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 1.0);
    let mut executor = MarketOrderExecutor::new(exchange.clone(), request, settings());

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Error);
    assert!(state.error.unwrap().contains("MIN_NOTIONAL"));
    assert!(state.children.is_empty());
  }

  #[tokio::test]
  async fn test_invalid_quantity_fails_before_submission() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, -1.0);
    let mut executor = MarketOrderExecutor::new(exchange.clone(), request, settings());

    let state = executor.execute().await;

    assert_eq!(state.status, ExecutionStatus::Error);
    assert!(exchange.read().await.submissions().is_empty());
  }

  #[tokio::test]
  async fn test_second_execute_does_not_resubmit() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let request = ExecutionRequest::new("BTCUSDT", OrderSide::Buy, 0.1);
    let mut executor = MarketOrderExecutor::new(exchange.clone(), request, settings());

    executor.execute().await;
    let again = executor.execute().await;

    assert_eq!(again.status, ExecutionStatus::Completed);
    assert_eq!(exchange.read().await.submissions().len(), 1);
  }
}
