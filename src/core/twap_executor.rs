/**
* filename : twap_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 시간 가중 분할 실행 (TWAP)
**/

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::core::order_monitor::MonitorOutcome;
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState, ExecutionStatus};
use crate::models::order::{OrderId, OrderRequest, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{require_non_negative, BasicRequestValidator, RequestValidator};
use crate::utils::calculate_time_slices;
use crate::utils::logging;
use crate::utils::math::{exact_add, exact_div, exact_sub};

/// TWAP 옵션
#[derive(Debug, Clone)]
pub struct TwapParams {
  /// 전체 실행 시간
  pub duration: Duration,
  /// 분할 횟수
  pub intervals: usize,
  /// 지정가 무작위 편차 (±%)
  pub price_variance: f64,
  /// true 면 시장가, false 면 지정가로 분할 실행
  pub use_market_orders: bool,
  /// 스케줄 종료 후 미체결 지정가 주문 감시 한도. None 이면 설정 기본값
  pub timeout: Option<Duration>,
}

impl Default for TwapParams {
  fn default() -> Self {
    TwapParams {
      duration: Duration::from_secs(3600),
      intervals: 12,
      price_variance: 0.1,
      use_market_orders: false,
      timeout: None,
    }
  }
}

impl TwapParams {
  pub fn validate(&self) -> Result<(), ExecutionError> {
    if self.intervals == 0 {
      return Err(ExecutionError::validation("intervals must be at least 1"));
    }
    if self.duration.is_zero() {
      return Err(ExecutionError::validation("duration must be positive"));
    }
    require_non_negative("price_variance", self.price_variance)?;
    if self.price_variance >= 100.0 {
      return Err(ExecutionError::validation("price_variance must be below 100"));
    }
    Ok(())
  }

  pub fn interval_length(&self) -> Duration {
    self.duration / self.intervals.max(1) as u32
  }
}

/// 실행 중인 TWAP 을 외부에서 중단하고 진행 상황을 읽는 핸들
#[derive(Clone)]
pub struct TwapStopHandle {
  cancel: CancellationToken,
  progress: watch::Receiver<ExecutionState>,
}

impl TwapStopHandle {
  /// 이후 제출을 막고 열린 하위 주문 취소를 요청
  pub fn stop(&self) {
    log::info!("TWAP 중단 요청");
    self.cancel.cancel();
  }

  pub fn is_stopped(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// 가장 최근 상태 스냅샷
  pub fn progress(&self) -> ExecutionState {
    self.progress.borrow().clone()
  }
}

/// TWAP 실행기
pub struct TwapExecutor {
  exchange: SharedExchange,
  settings: ExecutionSettings,
  ctx: ExecutionContext,
  request: ExecutionRequest,
  params: TwapParams,
  /// 중단 신호
  cancel: CancellationToken,
  progress_tx: watch::Sender<ExecutionState>,
  progress_rx: watch::Receiver<ExecutionState>,
  /// 실행 중인 스케줄 태스크. Some 이면 실제 상태는 태스크가 소유
  task: Option<JoinHandle<(ExecutionState, ExecutionContext)>>,
  state: ExecutionState,
}

impl TwapExecutor {
  pub fn new(
    exchange: SharedExchange,
    request: ExecutionRequest,
    params: TwapParams,
    settings: ExecutionSettings,
  ) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Twap,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    let (progress_tx, progress_rx) = watch::channel(state.clone());

    TwapExecutor {
      ctx: ExecutionContext::new(exchange.clone(), settings.clone()),
      exchange,
      settings,
      request,
      params,
      cancel: CancellationToken::new(),
      progress_tx,
      progress_rx,
      task: None,
      state,
    }
  }

  pub fn handle(&self) -> TwapStopHandle {
    TwapStopHandle {
      cancel: self.cancel.clone(),
      progress: self.progress_rx.clone(),
    }
  }

  /// 스케줄 중단
  pub fn stop(&self) {
    self.cancel.cancel();
  }

  /// 스케줄 태스크 종료를 기다려 상태와 컨텍스트를 회수
  async fn join_schedule(&mut self) -> Result<(), ExecutionError> {
    let Some(task) = self.task.as_mut() else {
      return Ok(());
    };
    let joined = task.await;
    self.task = None;

    match joined {
      Ok((state, ctx)) => {
        self.state = state;
        self.ctx = ctx;
        Ok(())
      }
      Err(e) => Err(ExecutionError::exchange(format!("TWAP schedule task failed: {}", e))),
    }
  }
}

#[async_trait]
impl Executor for TwapExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Twap
  }

  async fn execute(&mut self) -> ExecutionState {
    if !ensure_first_run(&self.state) {
      return self.state.clone();
    }

    let validated = BasicRequestValidator::without_price()
      .validate(&self.request)
      .and_then(|_| self.params.validate());
    if validated.is_err() {
      return finish(&mut self.state, validated);
    }

    self.state.begin();
    logging::log_execution_start(&self.state);
    self.progress_tx.send_replace(self.state.clone());

    let ctx = std::mem::replace(
      &mut self.ctx,
      ExecutionContext::new(self.exchange.clone(), self.settings.clone()),
    );
    let schedule = TwapSchedule {
      ctx,
      request: self.request.clone(),
      params: self.params.clone(),
      cancel: self.cancel.clone(),
      progress: self.progress_tx.clone(),
      state: self.state.clone(),
    };

    // 이 future 가 버려지면 스케줄도 중단되어 열린 주문을 취소한다
    self.task = Some(tokio::spawn(schedule.run()));
    let guard = self.cancel.clone().drop_guard();
    let result = self.join_schedule().await;
    let _ = guard.disarm();

    let snapshot = finish(&mut self.state, result);
    self.progress_tx.send_replace(snapshot.clone());
    snapshot
  }

  fn state(&self) -> ExecutionState {
    if self.task.is_some() {
      return self.progress_rx.borrow().clone();
    }
    self.state.clone()
  }

  async fn cancel_all(&mut self) -> ExecutionState {
    self.cancel.cancel();
    // execute() 가 도중에 버려졌으면 스케줄이 열린 주문을 정리할 때까지 대기
    if let Err(e) = self.join_schedule().await {
      logging::log_error("TWAP", &e);
      self.state = self.progress_rx.borrow().clone();
    }
    self.ctx.cancel_all(&mut self.state).await;
    self.progress_tx.send_replace(self.state.clone());
    self.state.clone()
  }

  fn stop_handle(&self) -> Option<TwapStopHandle> {
    Some(self.handle())
  }
}

/// 스폰된 태스크에서 실행되는 스케줄 루프
struct TwapSchedule {
  ctx: ExecutionContext,
  request: ExecutionRequest,
  params: TwapParams,
  cancel: CancellationToken,
  progress: watch::Sender<ExecutionState>,
  state: ExecutionState,
}

impl TwapSchedule {
  async fn run(mut self) -> (ExecutionState, ExecutionContext) {
    if let Err(e) = self.schedule().await {
      logging::log_error("TWAP", &e);
      self.state.fail(e.to_string());
    }
    (self.state, self.ctx)
  }

  async fn schedule(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();
    let side = self.request.side;
    let total = self.request.quantity;
    let intervals = self.params.intervals;
    let interval = self.params.interval_length();
    let start = Instant::now();

    if self.state.reference_price.is_none() {
      if let Some(price) = self.ctx.last_price(&symbol).await {
        self.state.set_reference_price(price);
      }
    }

    let order_quantity = self.ctx.quantizer.quantize_quantity(&symbol, exact_div(total, intervals)).await;
    if order_quantity <= 0.0 {
      return Err(ExecutionError::validation(format!(
        "slice size for {} over {} intervals is below the step size",
        total, intervals
      )));
    }

    log::info!(
      "TWAP 스케줄 시작: {} - {}회 x {:?} 간격 - 회당 {}",
      symbol, intervals, interval, order_quantity
    );

    let mut pending: Vec<OrderId> = Vec::new();
    let mut scheduled = 0.0;
    let mut accepted = 0;
    let mut last_error = None;

    let offsets = calculate_time_slices(self.params.duration, intervals);

    for (i, offset) in offsets.into_iter().enumerate() {
      let target = start + offset;
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => break,
        _ = sleep_until(target) => {}
      }

      // 대기 중 체결된 지정가 주문 반영
      if !pending.is_empty() {
        self.ctx.monitor.poll_once(&mut self.state, &mut pending).await;
      }
      if self.state.filled_quantity >= total * (1.0 - 1e-9) {
        log::info!("TWAP 목표 수량 체결 완료, 조기 종료: {}", symbol);
        break;
      }

      let remaining = self.ctx.quantizer.quantize_quantity(&symbol, exact_sub(total, scheduled)).await;
      let quantity = if i + 1 == intervals { remaining } else { order_quantity.min(remaining) };
      if quantity <= 0.0 {
        break;
      }
      scheduled = exact_add(scheduled, quantity);

      let order = if self.params.use_market_orders {
        OrderRequest::market(&symbol, side, quantity)
      } else {
        match self.slice_price().await {
          Some(price) => OrderRequest::limit(&symbol, side, quantity, price, TimeInForce::Gtc),
          None => {
            let e = ExecutionError::exchange("no price available for slice");
            self.state.record_slice_error(format!("slice {}: {}", i + 1, e));
            last_error = Some(e);
            continue;
          }
        }
      };

      match self.ctx.submit(&mut self.state, order).await {
        Ok(record) => {
          accepted += 1;
          if record.status.is_open() {
            pending.push(record.order_id);
          }
        }
        Err(e) => {
          log::warn!("TWAP 분할 주문 실패, 다음 회차 진행: {} {}/{} - {}", symbol, i + 1, intervals, e);
          self.state.record_slice_error(format!("slice {}: {}", i + 1, e));
          last_error = Some(e);
        }
      }
      self.progress.send_replace(self.state.clone());
    }

    if self.cancel.is_cancelled() {
      self.abort().await;
      return Ok(());
    }

    if accepted == 0 {
      return Err(last_error.unwrap_or_else(|| ExecutionError::exchange("no TWAP slice was accepted")));
    }

    if !pending.is_empty() {
      let timeout = self.params.timeout.unwrap_or_else(|| self.ctx.settings.default_timeout());
      let outcome = self
        .ctx
        .monitor
        .wait(&mut self.state, pending, timeout, Some(&self.cancel))
        .await;
      if outcome == MonitorOutcome::Canceled {
        self.abort().await;
        return Ok(());
      }
    }

    let next = if self.state.is_fully_filled() {
      ExecutionStatus::Completed
    } else {
      ExecutionStatus::PartiallyFilled
    };
    self.state.set_status(next);
    Ok(())
  }

  /// 중단 처리: 열린 하위 주문 취소 후 canceled
  async fn abort(&mut self) {
    log::info!("TWAP 중단: {} - 열린 주문 취소", self.request.symbol);
    self.ctx.cancel_open_children(&mut self.state).await;
    self.state.set_status(ExecutionStatus::Canceled);
  }

  /// 제출 직전 시세 갱신 후 무작위 편차를 적용한 지정가
  async fn slice_price(&mut self) -> Option<f64> {
    let symbol = self.request.symbol.clone();
    let base = match self.ctx.last_price(&symbol).await {
      Some(price) => price,
      None => self.request.price?,
    };
    let raw = jitter(base, self.params.price_variance);
    Some(self.ctx.quantizer.quantize_price(&symbol, raw).await)
  }
}

/// ±variance% 범위의 균등 무작위 편차 적용
fn jitter(price: f64, variance: f64) -> f64 {
  if variance <= 0.0 {
    return price;
  }
  let factor = rand::thread_rng().gen_range(-variance..=variance) / 100.0;
  price * (1.0 + factor)
}
