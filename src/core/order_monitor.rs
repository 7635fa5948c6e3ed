/**
* filename : order_monitor
* author : HAMA
* date: 2025. 5. 8.
* description: 하위 주문 상태 감시
**/

use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionState, ExecutionStatus};
use crate::models::order::{OrderId, OrderStatus};
use crate::utils::logging;

/// 감시 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
  /// 모든 추적 주문이 종료 상태에 도달
  Settled,
  /// 타임아웃 시점에 열린 주문이 남음
  TimedOut,
  /// 취소 신호 수신
  Canceled,
}

impl MonitorOutcome {
  /// 감시 결과를 집계 상태에 반영. 취소는 호출자가 처리한다
  pub fn apply(self, state: &mut ExecutionState) {
    match self {
      MonitorOutcome::Settled => state.settle(),
      MonitorOutcome::TimedOut => {
        state.set_status(ExecutionStatus::Timeout);
      }
      MonitorOutcome::Canceled => {}
    }
  }
}

/// 주문 상태 폴링 감시자
pub struct OrderMonitor {
  /// 거래소 인스턴스
  exchange: SharedExchange,
  /// 조회 주기
  poll_interval: Duration,
}

impl OrderMonitor {
  pub fn new(exchange: SharedExchange, poll_interval: Duration) -> Self {
    OrderMonitor {
      exchange,
      poll_interval,
    }
  }

  /// 추적 중인 주문을 한 번씩 조회하고 종료된 주문은 추적 목록에서 제거
  pub async fn poll_once(&self, state: &mut ExecutionState, tracked: &mut Vec<OrderId>) {
    let mut still_open = Vec::with_capacity(tracked.len());

    for order_id in std::mem::take(tracked) {
      let result = {
        let exchange = self.exchange.read().await;
        exchange.get_order(&state.symbol, &order_id).await
      };

      match result {
        Ok(record) => {
          let was_filled = state.child(&order_id).map(|c| c.status == OrderStatus::Filled).unwrap_or(false);
          state.apply_update(&record);

          if record.status == OrderStatus::Filled && !was_filled {
            logging::log_order_filled(&record);
          }
          if record.status.is_open() {
            still_open.push(order_id);
          } else {
            log::debug!("주문 종료: {} - 상태: {:?}", order_id, record.status);
          }
        }
        Err(e) if e.is_lookup() => {
          // 더 이상 존재하지 않는 주문은 종료된 것으로 간주
          log::warn!("주문 조회 불가, 추적 중단: {} - {}", order_id, e);
        }
        Err(e) => {
          log::warn!("주문 조회 실패, 다음 주기에 재시도: {} - {}", order_id, e);
          still_open.push(order_id);
        }
      }
    }

    *tracked = still_open;
  }

  /// 모든 주문이 종료되거나 타임아웃/취소될 때까지 감시
  pub async fn wait(
    &self,
    state: &mut ExecutionState,
    mut tracked: Vec<OrderId>,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
  ) -> MonitorOutcome {
    let deadline = Instant::now() + timeout;

    loop {
      self.poll_once(state, &mut tracked).await;

      if tracked.is_empty() {
        return MonitorOutcome::Settled;
      }

      let now = Instant::now();
      if now >= deadline {
        log::warn!("주문 감시 타임아웃: {} - 미종료 주문 {}개", state.symbol, tracked.len());
        return MonitorOutcome::TimedOut;
      }

      let nap = self.poll_interval.min(deadline - now);
      match cancel {
        Some(token) => {
          tokio::select! {
            _ = sleep(nap) => {}
            _ = token.cancelled() => return MonitorOutcome::Canceled,
          }
        }
        None => sleep(nap).await,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exchange::mocks::{LimitFill, MockExchange};
  use crate::exchange::traits::Exchange;
  use crate::models::execution::ExecutionAlgorithm;
  use crate::models::order::{OrderRequest, OrderSide, TimeInForce};
  use std::sync::Arc;
  use tokio::sync::RwLock;

  async fn place(exchange: &Arc<RwLock<MockExchange>>, state: &mut ExecutionState, qty: f64) -> OrderId {
    let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, qty, 49000.0, TimeInForce::Gtc);
    let record = exchange.write().await.create_order(request).await.unwrap();
    state.add_child(&record, qty, Some(49000.0));
    record.order_id
  }

  fn new_state() -> ExecutionState {
    let mut state = ExecutionState::new(ExecutionAlgorithm::Limit, "BTCUSDT", OrderSide::Buy, 1.0, Some(49000.0));
    state.begin();
    state
  }

  #[tokio::test(start_paused = true)]
  async fn test_monitor_settles_when_orders_fill() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let mut state = new_state();
    let order_id = place(&exchange, &mut state, 1.0).await;

    let filler = exchange.clone();
    let id = order_id.clone();
    tokio::spawn(async move {
      sleep(Duration::from_secs(5)).await;
      filler.write().await.fill_order(&id);
    });

    let monitor = OrderMonitor::new(exchange.clone(), Duration::from_secs(1));
    let outcome = monitor.wait(&mut state, vec![order_id], Duration::from_secs(60), None).await;
    outcome.apply(&mut state);

    assert_eq!(outcome, MonitorOutcome::Settled);
    assert_eq!(state.status, ExecutionStatus::Completed);
    assert_eq!(state.filled_quantity, 1.0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_monitor_times_out_without_canceling() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::Fraction(0.5));
    let mut state = new_state();
    let order_id = place(&exchange, &mut state, 1.0).await;

    let monitor = OrderMonitor::new(exchange.clone(), Duration::from_secs(2));
    let started = Instant::now();
    let outcome = monitor.wait(&mut state, vec![order_id], Duration::from_secs(10), None).await;
    outcome.apply(&mut state);

    assert_eq!(outcome, MonitorOutcome::TimedOut);
    assert_eq!(state.status, ExecutionStatus::Timeout);
    assert_eq!(state.filled_quantity, 0.5);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(exchange.read().await.cancel_requests().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_lookup_failure_removes_order() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let mut state = new_state();
    let lost = place(&exchange, &mut state, 0.5).await;
    let kept = place(&exchange, &mut state, 0.5).await;
    exchange.write().await.forget_order(&lost);
    exchange.write().await.fill_order(&kept);

    let monitor = OrderMonitor::new(exchange.clone(), Duration::from_secs(1));
    let outcome = monitor.wait(&mut state, vec![lost, kept], Duration::from_secs(30), None).await;

    assert_eq!(outcome, MonitorOutcome::Settled);
    assert_eq!(state.filled_quantity, 0.5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_signal_interrupts_wait() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    exchange.write().await.set_limit_fill(LimitFill::None);
    let mut state = new_state();
    let order_id = place(&exchange, &mut state, 1.0).await;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
      sleep(Duration::from_secs(3)).await;
      trigger.cancel();
    });

    let monitor = OrderMonitor::new(exchange.clone(), Duration::from_secs(1));
    let outcome = monitor.wait(&mut state, vec![order_id], Duration::from_secs(600), Some(&token)).await;
    assert_eq!(outcome, MonitorOutcome::Canceled);
  }
}
