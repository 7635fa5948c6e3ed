/**
* filename : scaled_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 가격 구간에 여러 지정가 주문을 동시에 배치
**/

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState};
use crate::models::order::{OrderRequest, OrderSide, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{require_positive, BasicRequestValidator, RequestValidator};
use crate::utils::logging;
use crate::utils::math::distribute;

/// 구간별 수량 분배 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
  /// 중심가에 가까울수록 많이 (순위 비례)
  #[default]
  Linear,
  /// 중심가에서 한 단계 멀어질 때마다 절반
  Geometric,
  /// 균등 분배
  Uniform,
}

impl Distribution {
  pub fn as_str(&self) -> &'static str {
    match self {
      Distribution::Linear => "linear",
      Distribution::Geometric => "geometric",
      Distribution::Uniform => "uniform",
    }
  }

  /// 레벨별 가중치. 0 번이 중심가
  pub fn weights(&self, levels: usize) -> Vec<f64> {
    (0..levels)
      .map(|i| match self {
        Distribution::Linear => (levels - i) as f64,
        Distribution::Geometric => 2f64.powi((levels - 1 - i) as i32),
        Distribution::Uniform => 1.0,
      })
      .collect()
  }
}

impl fmt::Display for Distribution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Distribution {
  type Err = ExecutionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "linear" => Ok(Distribution::Linear),
      "geometric" => Ok(Distribution::Geometric),
      "uniform" => Ok(Distribution::Uniform),
      _ => Err(ExecutionError::validation(format!("unknown distribution: {}", s))),
    }
  }
}

/// Scaled 옵션
#[derive(Debug, Clone)]
pub struct ScaledParams {
  /// 가격 레벨 수
  pub levels: usize,
  /// 중심가 대비 구간 폭 (%)
  pub price_range_pct: f64,
  pub distribution: Distribution,
  pub time_in_force: TimeInForce,
  /// 감시 타임아웃. None 이면 설정 기본값
  pub timeout: Option<Duration>,
}

impl Default for ScaledParams {
  fn default() -> Self {
    ScaledParams {
      levels: 5,
      price_range_pct: 1.0,
      distribution: Distribution::Linear,
      time_in_force: TimeInForce::Gtc,
      timeout: None,
    }
  }
}

impl ScaledParams {
  pub fn validate(&self) -> Result<(), ExecutionError> {
    if self.levels == 0 {
      return Err(ExecutionError::validation("scale_levels must be at least 1"));
    }
    require_positive("price_range_pct", self.price_range_pct)?;
    if self.price_range_pct >= 100.0 {
      return Err(ExecutionError::validation("price_range_pct must be below 100"));
    }
    Ok(())
  }

  /// 방향별 가격 구간 (low, high). 매수는 중심가 아래, 매도는 위
  pub fn band(&self, side: OrderSide, center: f64) -> (f64, f64) {
    let range = center * self.price_range_pct / 100.0;
    match side {
      OrderSide::Buy => (center - range, center),
      OrderSide::Sell => (center, center + range),
    }
  }

  /// i 번째 레벨 원시 가격. 0 번이 중심가, 마지막이 구간 끝
  pub fn level_price(&self, side: OrderSide, center: f64, index: usize) -> f64 {
    if self.levels <= 1 {
      return center;
    }
    let range = center * self.price_range_pct / 100.0;
    let step = range * index as f64 / (self.levels - 1) as f64;
    match side {
      OrderSide::Buy => center - step,
      OrderSide::Sell => center + step,
    }
  }
}

/// Scaled 주문 실행기
pub struct ScaledOrderExecutor {
  ctx: ExecutionContext,
  request: ExecutionRequest,
  params: ScaledParams,
  state: ExecutionState,
}

impl ScaledOrderExecutor {
  pub fn new(
    exchange: SharedExchange,
    request: ExecutionRequest,
    params: ScaledParams,
    settings: ExecutionSettings,
  ) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Scaled,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    ScaledOrderExecutor {
      ctx: ExecutionContext::new(exchange, settings),
      request,
      params,
      state,
    }
  }

  async fn run(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();
    let side = self.request.side;
    let levels = self.params.levels;
    let center = self
      .request
      .price
      .ok_or_else(|| ExecutionError::validation("price is required"))?;

    let (low, high) = self.params.band(side, center);
    let raw_quantities = distribute(self.request.quantity, &self.params.distribution.weights(levels));

    log::info!(
      "Scaled 배치: {} {} - {}개 레벨 [{:.8}, {:.8}] - 분배 {}",
      symbol, side, levels, low, high, self.params.distribution
    );

    let mut accepted = 0;
    let mut last_error = None;

    for (i, raw_quantity) in raw_quantities.into_iter().enumerate() {
      let raw_price = self.params.level_price(side, center, i);
      let price = self.ctx.quantizer.quantize_price_in_band(&symbol, raw_price, low, high).await;
      let quantity = self.ctx.quantizer.quantize_quantity(&symbol, raw_quantity).await;

      if quantity <= 0.0 {
        let e = ExecutionError::validation(format!("level {} quantity {} is below the step size", i + 1, raw_quantity));
        log::warn!("Scaled 레벨 건너뜀: {} - {}", symbol, e);
        self.state.record_slice_error(format!("level {}: {}", i + 1, e));
        last_error = Some(e);
        continue;
      }

      if accepted > 0 || last_error.is_some() {
        sleep(self.ctx.settings.submission_delay()).await;
      }

      let order = OrderRequest::limit(&symbol, side, quantity, price, self.params.time_in_force);
      match self.ctx.submit(&mut self.state, order).await {
        Ok(_) => accepted += 1,
        Err(e) => {
          log::warn!("Scaled 레벨 주문 실패, 다음 레벨 진행: {} {}/{} - {}", symbol, i + 1, levels, e);
          self.state.record_slice_error(format!("level {}: {}", i + 1, e));
          last_error = Some(e);
        }
      }
    }

    if accepted == 0 {
      return Err(last_error.unwrap_or_else(|| ExecutionError::exchange("no scaled level was accepted")));
    }

    let timeout = self.params.timeout.unwrap_or_else(|| self.ctx.settings.default_timeout());
    let tracked = self.state.open_children();
    let outcome = self.ctx.monitor.wait(&mut self.state, tracked, timeout, None).await;
    outcome.apply(&mut self.state);
    Ok(())
  }
}

#[async_trait]
impl Executor for ScaledOrderExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Scaled
  }

  async fn execute(&mut self) -> ExecutionState {
    if !ensure_first_run(&self.state) {
      return self.state.clone();
    }

    let validated = BasicRequestValidator::with_price()
      .validate(&self.request)
      .and_then(|_| self.params.validate());
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
