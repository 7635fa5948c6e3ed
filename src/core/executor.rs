/**
* filename : executor
* author : HAMA
* date: 2025. 5. 8.
* description: 실행 알고리즘 공통 인터페이스와 실행 컨텍스트
**/

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ExecutionSettings;
use crate::core::order_monitor::OrderMonitor;
use crate::core::quantizer::Quantizer;
use crate::core::twap_executor::TwapStopHandle;
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState, ExecutionStatus};
use crate::models::order::{OrderId, OrderRecord, OrderRequest};
use crate::utils::logging;

/// 실행 알고리즘 인터페이스
///
/// 실행기는 일회용이다. 한 인스턴스에서 `execute`는 한 번만 유효하며,
/// 두 번째 호출은 주문을 내지 않고 현재 상태를 돌려준다.
#[async_trait]
pub trait Executor: Send + Sync {
  /// 알고리즘 종류
  fn algorithm(&self) -> ExecutionAlgorithm;

  /// 실행 후 최종 상태 반환. 모든 실패는 상태의 status/error 에 기록된다
  async fn execute(&mut self) -> ExecutionState;

  /// 현재 상태 스냅샷
  fn state(&self) -> ExecutionState;

  /// 열린 하위 주문을 모두 취소하고 canceled 로 전환
  async fn cancel_all(&mut self) -> ExecutionState;

  /// 실행 중 외부에서 중단할 수 있는 핸들 (TWAP 전용)
  fn stop_handle(&self) -> Option<TwapStopHandle> {
    None
  }
}

/// 실행기 하나가 소유하는 거래소 접근 묶음
pub struct ExecutionContext {
  pub exchange: SharedExchange,
  pub quantizer: Quantizer,
  pub monitor: OrderMonitor,
  pub settings: ExecutionSettings,
}

impl ExecutionContext {
  pub fn new(exchange: SharedExchange, settings: ExecutionSettings) -> Self {
    ExecutionContext {
      quantizer: Quantizer::new(exchange.clone()),
      monitor: OrderMonitor::new(exchange.clone(), settings.poll_interval()),
      exchange,
      settings,
    }
  }

  /// 하위 주문 제출. 성공하면 상태에 하위 주문으로 등록한다
  pub async fn submit(
    &self,
    state: &mut ExecutionState,
    request: OrderRequest,
  ) -> Result<OrderRecord, ExecutionError> {
    let request = if request.client_order_id.is_some() {
      request
    } else {
      let client_id = format!("xexec-{}", Uuid::new_v4().simple());
      request.with_client_order_id(client_id)
    };
    let quantity = request.quantity.unwrap_or(0.0);
    let price = request.price;

    let record = {
      let mut exchange = self.exchange.write().await;
      exchange.create_order(request).await?
    };

    logging::log_order_submitted(&record, quantity, price);
    state.add_child(&record, quantity, price);
    Ok(record)
  }

  /// 최근 체결가 조회. 실패 시 None
  pub async fn last_price(&self, symbol: &str) -> Option<f64> {
    let result = {
      let exchange = self.exchange.read().await;
      exchange.get_symbol_ticker(symbol).await
    };

    match result {
      Ok(price) if price > 0.0 => Some(price),
      Ok(price) => {
        log::warn!("비정상 시세 무시: {} - {}", symbol, price);
        None
      }
      Err(e) => {
        log::warn!("시세 조회 실패: {} - {}", symbol, e);
        None
      }
    }
  }

  /// 열린 하위 주문 취소 후 최종 체결 상태를 한 번 더 조회. 취소 요청 수 반환
  pub async fn cancel_open_children(&self, state: &mut ExecutionState) -> usize {
    let open = state.open_children();
    let mut requested = 0;

    for order_id in &open {
      let result = {
        let mut exchange = self.exchange.write().await;
        exchange.cancel_order(&state.symbol, order_id).await
      };
      requested += 1;

      match result {
        Ok(()) => logging::log_order_canceled(&order_id.0),
        Err(e) if e.is_lookup() => log::warn!("취소 대상 주문 없음: {} - {}", order_id, e),
        Err(e) => log::warn!("주문 취소 실패: {} - {}", order_id, e),
      }
    }

    let mut tracked: Vec<OrderId> = open;
    self.monitor.poll_once(state, &mut tracked).await;
    requested
  }

  /// cancel_all 공통 처리
  pub async fn cancel_all(&self, state: &mut ExecutionState) {
    match state.status {
      ExecutionStatus::Completed | ExecutionStatus::Error | ExecutionStatus::Canceled => {
        log::debug!("이미 종료된 실행, 취소 생략: {} {}", state.algorithm, state.symbol);
        return;
      }
      _ => {}
    }

    let count = self.cancel_open_children(state).await;
    log::info!("실행 취소: {} {} - 취소 요청 {}건", state.algorithm, state.symbol, count);
    state.set_status(ExecutionStatus::Canceled);
  }
}

/// 재실행 방지 확인. 처음 실행이면 true
pub(crate) fn ensure_first_run(state: &ExecutionState) -> bool {
  if state.status == ExecutionStatus::Initialized {
    return true;
  }
  log::warn!(
    "실행기는 한 번만 실행 가능: {} {} - 현재 상태 {}",
    state.algorithm, state.symbol, state.status
  );
  false
}

/// 실행 결과 반영 공통 처리. 오류는 상태에 기록된다
pub(crate) fn finish(state: &mut ExecutionState, result: Result<(), ExecutionError>) -> ExecutionState {
  if let Err(e) = result {
    logging::log_error(&format!("{} {}", state.algorithm, state.symbol), &e);
    state.fail(e.to_string());
  }
  logging::log_execution_end(state);
  state.clone()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exchange::mocks::{LimitFill, MockExchange};
  use crate::models::order::{OrderSide, OrderStatus, TimeInForce};
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
  async fn test_submit_registers_child_with_client_id() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let ctx = ExecutionContext::new(exchange.clone(), settings());
    let mut state = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, Some(50000.0));
    state.begin();

    let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 1.0, 49000.0, TimeInForce::Gtc);
    let record = ctx.submit(&mut state, request).await.unwrap();

    assert_eq!(state.children.len(), 1);
    assert_eq!(state.children[0].order_id, record.order_id);
    let mock = exchange.read().await;
    let client_id = mock.submissions()[0].request.client_order_id.clone().unwrap();
    assert!(client_id.starts_with("xexec-"));
  }

  #[tokio::test]
  async fn test_cancel_all_cancels_open_children() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let ctx = ExecutionContext::new(exchange.clone(), settings());
    let mut state = ExecutionState::new(ExecutionAlgorithm::Scaled, "BTCUSDT", OrderSide::Buy, 1.0, Some(50000.0));
    state.begin();

    for price in [49000.0, 48000.0] {
      let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.5, price, TimeInForce::Gtc);
      ctx.submit(&mut state, request).await.unwrap();
    }

    ctx.cancel_all(&mut state).await;

    assert_eq!(state.status, ExecutionStatus::Canceled);
    assert_eq!(exchange.read().await.cancel_requests().len(), 2);
    assert!(state.children.iter().all(|c| c.status == OrderStatus::Canceled));
  }

  #[test]
  fn test_finish_records_error() {
    let mut state = ExecutionState::new(ExecutionAlgorithm::Market, "BTCUSDT", OrderSide::Sell, 1.0, None);
    state.begin();
    let snapshot = finish(&mut state, Err(ExecutionError::exchange("insufficient balance")));

    assert_eq!(snapshot.status, ExecutionStatus::Error);
    assert!(snapshot.error.unwrap().contains("insufficient balance"));
    assert!(!ensure_first_run(&state));
  }
}
