/**
* filename : recommender
* author : HAMA
* date: 2025. 5. 8.
* description: 시장 상황에 맞는 실행 알고리즘 추천
**/

use crate::models::execution::ExecutionAlgorithm;

/// 주문 규모가 거래량 대비 크다고 보는 비율
pub const LARGE_ORDER_RATIO: f64 = 0.1;
/// 대량 주문에서 TWAP 을 고르는 변동성
pub const HIGH_VOLATILITY: f64 = 0.05;
/// 소량 주문에서 지정가 계열을 고르는 변동성
pub const MODERATE_VOLATILITY: f64 = 0.02;
/// Scaled 를 고르는 스프레드
pub const WIDE_SPREAD: f64 = 0.01;

/// 추천에 쓰는 시장 지표
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketConditions {
  /// 주문 수량
  pub quantity: f64,
  /// 최근 평균 거래량
  pub average_volume: f64,
  /// 최근 변동성 (비율)
  pub volatility: f64,
  /// 현재 스프레드 (비율)
  pub spread: f64,
}

impl MarketConditions {
  pub fn new(quantity: f64, average_volume: f64, volatility: f64, spread: f64) -> Self {
    MarketConditions {
      quantity,
      average_volume,
      volatility,
      spread,
    }
  }

  /// 거래량 대비 주문 규모. 거래량 정보가 없으면 대량 주문으로 본다
  pub fn size_ratio(&self) -> f64 {
    if self.average_volume > 0.0 {
      self.quantity / self.average_volume
    } else {
      f64::INFINITY
    }
  }

  pub fn recommend(&self) -> ExecutionAlgorithm {
    if self.size_ratio() > LARGE_ORDER_RATIO {
      if self.volatility > HIGH_VOLATILITY {
        ExecutionAlgorithm::Twap
      } else {
        ExecutionAlgorithm::Iceberg
      }
    } else if self.volatility > MODERATE_VOLATILITY {
      if self.spread > WIDE_SPREAD {
        ExecutionAlgorithm::Scaled
      } else {
        ExecutionAlgorithm::Limit
      }
    } else {
      ExecutionAlgorithm::Market
    }
  }
}

/// 실행 알고리즘 추천. 네트워크 호출 없는 순수 함수
pub fn recommend(quantity: f64, average_volume: f64, volatility: f64, spread: f64) -> ExecutionAlgorithm {
  MarketConditions::new(quantity, average_volume, volatility, spread).recommend()
}
