/**
* filename : executor_factory
* author : HAMA
* date: 2025. 5. 8.
* description: 알고리즘 이름과 파라미터로 실행기 생성
**/

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::config::ExecutionSettings;
use crate::core::executor::Executor;
use crate::core::iceberg_executor::{IcebergOrderExecutor, IcebergParams};
use crate::core::limit_executor::{LimitOrderExecutor, LimitParams};
use crate::core::market_executor::MarketOrderExecutor;
use crate::core::oco_executor::{OcoOrderExecutor, OcoParams};
use crate::core::scaled_executor::{Distribution, ScaledOrderExecutor, ScaledParams};
use crate::core::twap_executor::{TwapExecutor, TwapParams};
use crate::exchange::traits::SharedExchange;
use crate::models::execution::ExecutionAlgorithm;
use crate::models::order::{OrderSide, TimeInForce};
use crate::models::request::ExecutionRequest;
use crate::utils::secs_to_duration;

/// 모든 알고리즘 파라미터를 담는 평면 구조. 알고리즘별로 필요한 필드만 읽는다
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorParams {
  pub symbol: String,
  pub side: OrderSide,
  pub quantity: f64,
  #[serde(default)]
  pub price: Option<f64>,
  #[serde(default)]
  pub time_in_force: Option<TimeInForce>,
  #[serde(default)]
  pub post_only: bool,
  #[serde(default)]
  pub iceberg_parts: Option<usize>,
  #[serde(default)]
  pub price_variance: Option<f64>,
  /// 초 단위
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub intervals: Option<usize>,
  #[serde(default)]
  pub use_market_orders: Option<bool>,
  #[serde(default)]
  pub scale_levels: Option<usize>,
  #[serde(default)]
  pub price_range_pct: Option<f64>,
  #[serde(default)]
  pub distribution: Option<Distribution>,
  #[serde(default)]
  pub stop_price: Option<f64>,
  #[serde(default)]
  pub stop_limit_price: Option<f64>,
  #[serde(default)]
  pub stop_limit_time_in_force: Option<TimeInForce>,
  /// 감시 타임아웃 (초)
  #[serde(default)]
  pub timeout: Option<f64>,
}

impl ExecutorParams {
  pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
    ExecutorParams {
      symbol: symbol.into(),
      side,
      quantity,
      price: None,
      time_in_force: None,
      post_only: false,
      iceberg_parts: None,
      price_variance: None,
      duration: None,
      intervals: None,
      use_market_orders: None,
      scale_levels: None,
      price_range_pct: None,
      distribution: None,
      stop_price: None,
      stop_limit_price: None,
      stop_limit_time_in_force: None,
      timeout: None,
    }
  }

  pub fn with_price(mut self, price: f64) -> Self {
    self.price = Some(price);
    self
  }

  pub fn request(&self) -> ExecutionRequest {
    let request = ExecutionRequest::new(&self.symbol, self.side, self.quantity);
    match self.price {
      Some(price) => request.with_price(price),
      None => request,
    }
  }

  fn timeout(&self) -> Option<Duration> {
    self.timeout.map(secs_to_duration)
  }

  pub fn limit_params(&self) -> LimitParams {
    LimitParams {
      time_in_force: self.time_in_force.unwrap_or_default(),
      post_only: self.post_only,
      timeout: self.timeout(),
    }
  }

  pub fn iceberg_params(&self) -> IcebergParams {
    let defaults = IcebergParams::default();
    IcebergParams {
      parts: self.iceberg_parts.unwrap_or(defaults.parts),
      price_variance: self.price_variance.unwrap_or(defaults.price_variance),
      time_in_force: self.time_in_force.unwrap_or(defaults.time_in_force),
      timeout: self.timeout(),
    }
  }

  pub fn twap_params(&self) -> TwapParams {
    let defaults = TwapParams::default();
    TwapParams {
      duration: self.duration.map(secs_to_duration).unwrap_or(defaults.duration),
      intervals: self.intervals.unwrap_or(defaults.intervals),
      price_variance: self.price_variance.unwrap_or(defaults.price_variance),
      use_market_orders: self.use_market_orders.unwrap_or(defaults.use_market_orders),
      timeout: self.timeout(),
    }
  }

  pub fn scaled_params(&self) -> ScaledParams {
    let defaults = ScaledParams::default();
    ScaledParams {
      levels: self.scale_levels.unwrap_or(defaults.levels),
      price_range_pct: self.price_range_pct.unwrap_or(defaults.price_range_pct),
      distribution: self.distribution.unwrap_or(defaults.distribution),
      time_in_force: self.time_in_force.unwrap_or(defaults.time_in_force),
      timeout: self.timeout(),
    }
  }

  /// 손절가가 없으면 0 으로 두어 실행 시 검증에서 걸러진다
  pub fn oco_params(&self) -> OcoParams {
    let stop_price = self.stop_price.unwrap_or(0.0);
    OcoParams {
      stop_price,
      stop_limit_price: self.stop_limit_price.unwrap_or(stop_price),
      stop_limit_time_in_force: self.stop_limit_time_in_force.unwrap_or_default(),
    }
  }
}

/// 실행기 생성기
pub struct ExecutorFactory {
  exchange: SharedExchange,
  settings: ExecutionSettings,
}

impl ExecutorFactory {
  pub fn new(exchange: SharedExchange, settings: ExecutionSettings) -> Self {
    ExecutorFactory { exchange, settings }
  }

  /// 이름으로 실행기 생성. 알 수 없는 이름은 시장가 실행기로 대체
  pub fn create(&self, type_name: &str, params: ExecutorParams) -> Box<dyn Executor> {
    let algorithm = match type_name.parse::<ExecutionAlgorithm>() {
      Ok(algorithm) => algorithm,
      Err(_) => {
        log::warn!("알 수 없는 실행 유형 '{}', 시장가 실행으로 대체", type_name);
        ExecutionAlgorithm::Market
      }
    };
    self.create_for(algorithm, params)
  }

  pub fn create_for(&self, algorithm: ExecutionAlgorithm, params: ExecutorParams) -> Box<dyn Executor> {
    let exchange = self.exchange.clone();
    let settings = self.settings.clone();
    let request = params.request();

    match algorithm {
      ExecutionAlgorithm::Market => Box::new(MarketOrderExecutor::new(exchange, request, settings)),
      ExecutionAlgorithm::Limit => {
        Box::new(LimitOrderExecutor::new(exchange, request, params.limit_params(), settings))
      }
      ExecutionAlgorithm::Iceberg => {
        Box::new(IcebergOrderExecutor::new(exchange, request, params.iceberg_params(), settings))
      }
      ExecutionAlgorithm::Twap => Box::new(TwapExecutor::new(exchange, request, params.twap_params(), settings)),
      ExecutionAlgorithm::Scaled => {
        Box::new(ScaledOrderExecutor::new(exchange, request, params.scaled_params(), settings))
      }
      ExecutionAlgorithm::Oco => Box::new(OcoOrderExecutor::new(exchange, request, params.oco_params(), settings)),
    }
  }
}

/// 기본 설정으로 실행기 생성
pub fn create_executor(type_name: &str, exchange: SharedExchange, params: ExecutorParams) -> Box<dyn Executor> {
  ExecutorFactory::new(exchange, ExecutionSettings::default()).create(type_name, params)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exchange::mocks::MockExchange;
  use std::sync::Arc;
  use tokio::sync::RwLock;

  #[test]
  fn test_params_from_json() {
    let json = r#"{
      "symbol": "BTCUSDT",
      "side": "buy",
      "quantity": 2.0,
      "price": 50000.0,
      "scale_levels": 4,
      "price_range_pct": 2.0,
      "distribution": "uniform",
      "timeout": 90
    }"#;
    let params: ExecutorParams = serde_json::from_str(json).unwrap();

    assert_eq!(params.side, OrderSide::Buy);
    let scaled = params.scaled_params();
    assert_eq!(scaled.levels, 4);
    assert_eq!(scaled.distribution, Distribution::Uniform);
    assert_eq!(scaled.timeout, Some(Duration::from_secs(90)));
    assert_eq!(params.request().price, Some(50000.0));
  }

  #[test]
  fn test_defaults_fill_missing_fields() {
    let params = ExecutorParams::new("ETHUSDT", OrderSide::Sell, 1.0);

    assert_eq!(params.iceberg_params().parts, IcebergParams::default().parts);
    assert_eq!(params.twap_params().intervals, TwapParams::default().intervals);
    assert_eq!(params.limit_params().time_in_force, TimeInForce::Gtc);
    assert_eq!(params.oco_params().stop_price, 0.0);
  }

  #[test]
  fn test_every_algorithm_is_constructed() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let factory = ExecutorFactory::new(exchange, ExecutionSettings::default());

    for name in ["market", "limit", "iceberg", "twap", "scaled", "oco", "TWAP"] {
      let executor = factory.create(name, ExecutorParams::new("BTCUSDT", OrderSide::Buy, 1.0));
      assert_eq!(executor.algorithm(), name.parse::<ExecutionAlgorithm>().unwrap());
    }
  }

  #[test]
  fn test_unknown_type_falls_back_to_market() {
    let exchange = Arc::new(RwLock::new(MockExchange::new()));
    let executor = create_executor("unknown_type", exchange, ExecutorParams::new("BTCUSDT", OrderSide::Buy, 1.0));

    assert_eq!(executor.algorithm(), ExecutionAlgorithm::Market);
    assert_eq!(executor.state().status, crate::models::execution::ExecutionStatus::Initialized);
  }
}
