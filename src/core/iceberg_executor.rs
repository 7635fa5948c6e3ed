/**
* filename : iceberg_executor
* author : HAMA
* date: 2025. 5. 8.
* description: 대량 주문을 여러 지정가 주문으로 나눠 순차 제출
**/

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use crate::config::ExecutionSettings;
use crate::core::executor::{ensure_first_run, finish, ExecutionContext, Executor};
use crate::error::ExecutionError;
use crate::exchange::traits::SharedExchange;
use crate::models::execution::{ExecutionAlgorithm, ExecutionState};
use crate::models::order::{OrderRequest, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::order_core::validator::{require_non_negative, BasicRequestValidator, RequestValidator};
use crate::utils::logging;
use crate::utils::math::{exact_div, exact_sub};

/// Iceberg 옵션
#[derive(Debug, Clone)]
pub struct IcebergParams {
  /// 분할 주문 수
  pub parts: usize,
  /// 분할 주문 간 가격 차이 (%)
  pub price_variance: f64,
  pub time_in_force: TimeInForce,
  /// 감시 타임아웃. None 이면 설정 기본값
  pub timeout: Option<Duration>,
}

impl Default for IcebergParams {
  fn default() -> Self {
    IcebergParams {
      parts: 5,
      price_variance: 0.0,
      time_in_force: TimeInForce::Gtc,
      timeout: None,
    }
  }
}

impl IcebergParams {
  pub fn validate(&self) -> Result<(), ExecutionError> {
    if self.parts == 0 {
      return Err(ExecutionError::validation("iceberg_parts must be at least 1"));
    }
    require_non_negative("price_variance", self.price_variance)?;
    if self.price_variance >= 100.0 {
      return Err(ExecutionError::validation("price_variance must be below 100"));
    }
    // 가장 낮은 분할 가격이 0 이하가 되지 않아야 함
    if self.price_variance * (self.parts as f64 - 1.0) / 2.0 >= 100.0 {
      return Err(ExecutionError::validation(format!(
        "price_variance {}% over {} parts pushes the lowest part price to zero",
        self.price_variance, self.parts
      )));
    }
    Ok(())
  }

  /// i 번째 분할 주문의 기준가 대비 가격 계수. 기준가를 중심으로 대칭
  pub fn price_offset(&self, index: usize) -> f64 {
    let center = (self.parts as f64 - 1.0) / 2.0;
    self.price_variance / 100.0 * (index as f64 - center)
  }
}

/// Iceberg 주문 실행기
pub struct IcebergOrderExecutor {
  /// 거래소 접근
  ctx: ExecutionContext,
  /// 실행 요청
  request: ExecutionRequest,
  /// 분할 옵션
  params: IcebergParams,
  /// 집계 상태
  state: ExecutionState,
}

impl IcebergOrderExecutor {
  pub fn new(
    exchange: SharedExchange,
    request: ExecutionRequest,
    params: IcebergParams,
    settings: ExecutionSettings,
  ) -> Self {
    let state = ExecutionState::new(
      ExecutionAlgorithm::Iceberg,
      &request.symbol,
      request.side,
      request.quantity,
      request.price,
    );
    IcebergOrderExecutor {
      ctx: ExecutionContext::new(exchange, settings),
      request,
      params,
      state,
    }
  }

  async fn run(&mut self) -> Result<(), ExecutionError> {
    let symbol = self.request.symbol.clone();
    let side = self.request.side;
    let parts = self.params.parts;
    let base_price = self
      .request
      .price
      .ok_or_else(|| ExecutionError::validation("price is required"))?;

    let part_size = self
      .ctx
      .quantizer
      .quantize_quantity(&symbol, exact_div(self.request.quantity, parts))
      .await;
    if part_size <= 0.0 {
      return Err(ExecutionError::validation(format!(
        "part size for {} over {} parts is below the step size",
        self.request.quantity, parts
      )));
    }

    let mut remaining = self.request.quantity;
    let mut accepted = 0;
    let mut last_error = None;

    for i in 0..parts {
      // 마지막 분할은 단위 보정 후 남은 수량 전부
      let quantity = if i + 1 == parts {
        self.ctx.quantizer.quantize_quantity(&symbol, remaining).await
      } else {
        part_size.min(self.ctx.quantizer.quantize_quantity(&symbol, remaining).await)
      };
      if quantity <= 0.0 {
        log::info!("Iceberg 잔량 소진, 조기 종료: {} - {}/{} 분할", symbol, i, parts);
        break;
      }
      remaining = exact_sub(remaining, quantity);

      let raw_price = base_price * (1.0 + self.params.price_offset(i));
      let price = self.ctx.quantizer.quantize_price(&symbol, raw_price).await;
      if !(price > 0.0) {
        let e = ExecutionError::validation(format!("part price {} is not positive", price));
        log::warn!("Iceberg 분할 가격 오류, 제출 생략: {} {}/{} - {}", symbol, i + 1, parts, e);
        self.state.record_slice_error(format!("part {}: {}", i + 1, e));
        last_error = Some(e);
        continue;
      }

      if i > 0 {
        sleep(self.ctx.settings.submission_delay()).await;
      }

      let order = OrderRequest::limit(&symbol, side, quantity, price, self.params.time_in_force);
      match self.ctx.submit(&mut self.state, order).await {
        Ok(_) => accepted += 1,
        Err(e) => {
          log::warn!("Iceberg 분할 주문 실패, 다음 분할 진행: {} {}/{} - {}", symbol, i + 1, parts, e);
          self.state.record_slice_error(format!("part {}: {}", i + 1, e));
          last_error = Some(e);
        }
      }
    }

    if accepted == 0 {
      return Err(last_error.unwrap_or_else(|| ExecutionError::exchange("no iceberg part was accepted")));
    }

    let timeout = self.params.timeout.unwrap_or_else(|| self.ctx.settings.default_timeout());
    let tracked = self.state.open_children();
    let outcome = self.ctx.monitor.wait(&mut self.state, tracked, timeout, None).await;
    outcome.apply(&mut self.state);
    Ok(())
  }
}

#[async_trait]
impl Executor for IcebergOrderExecutor {
  fn algorithm(&self) -> ExecutionAlgorithm {
    ExecutionAlgorithm::Iceberg
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
