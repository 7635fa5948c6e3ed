/**
* filename : quantizer
* author : HAMA
* date: 2025. 5. 8.
* description: 거래소 수량/가격 단위 보정
**/

use std::collections::HashMap;

use crate::exchange::traits::SharedExchange;
use crate::models::order::SymbolInfo;
use crate::utils::math::{ceil_to_step, clamp, floor_to_step};

/// 심볼 단위 규칙에 맞춰 수량과 가격을 내림 보정
///
/// 심볼 정보는 인스턴스 수명 동안만 캐시한다. 정보 조회에 실패하면 입력값을 그대로 돌려준다.
pub struct Quantizer {
  /// 거래소 인스턴스
  exchange: SharedExchange,
  /// 심볼별 단위 규칙 캐시
  cache: HashMap<String, SymbolInfo>,
}

impl Quantizer {
  pub fn new(exchange: SharedExchange) -> Self {
    Quantizer {
      exchange,
      cache: HashMap::new(),
    }
  }

  /// 심볼 정보 조회 (캐시 우선)
  pub async fn symbol_info(&mut self, symbol: &str) -> Option<SymbolInfo> {
    if let Some(info) = self.cache.get(symbol) {
      return Some(info.clone());
    }

    let result = {
      let exchange = self.exchange.read().await;
      exchange.get_symbol_info(symbol).await
    };

    match result {
      Ok(info) => {
        self.cache.insert(symbol.to_string(), info.clone());
        Some(info)
      }
      Err(e) => {
        log::warn!("심볼 정보 조회 실패, 단위 보정 없이 진행: {} - {}", symbol, e);
        None
      }
    }
  }

  /// 수량을 step size 배수로 내림
  pub async fn quantize_quantity(&mut self, symbol: &str, raw_quantity: f64) -> f64 {
    let info = self.symbol_info(symbol).await;
    Self::apply_quantity(info.as_ref(), raw_quantity)
  }

  /// 가격을 tick size 배수로 내림 후 거래소 가격 범위로 제한
  pub async fn quantize_price(&mut self, symbol: &str, raw_price: f64) -> f64 {
    let info = self.symbol_info(symbol).await;
    Self::apply_price(info.as_ref(), raw_price)
  }

  /// 가격을 내림 보정하되 [low, high] 구간을 벗어나지 않게 조정
  pub async fn quantize_price_in_band(&mut self, symbol: &str, raw_price: f64, low: f64, high: f64) -> f64 {
    let info = self.symbol_info(symbol).await;
    let price = Self::apply_price(info.as_ref(), raw_price);

    match info.as_ref() {
      Some(info) if price < low => Self::apply_price(Some(info), ceil_to_step(low, info.tick_size)).min(high),
      _ => clamp(price, low, high),
    }
  }

  pub fn apply_quantity(info: Option<&SymbolInfo>, raw_quantity: f64) -> f64 {
    match info {
      Some(info) => floor_to_step(raw_quantity, info.step_size),
      None => raw_quantity,
    }
  }

  pub fn apply_price(info: Option<&SymbolInfo>, raw_price: f64) -> f64 {
    let Some(info) = info else {
      return raw_price;
    };

    let mut price = floor_to_step(raw_price, info.tick_size);
    if let Some(max_price) = info.max_price {
      if price > max_price {
        price = floor_to_step(max_price, info.tick_size);
      }
    }
    if let Some(min_price) = info.min_price {
      if price < min_price {
        price = ceil_to_step(min_price, info.tick_size);
      }
    }
    price
  }

  /// 특정 심볼 캐시 무효화
  pub fn invalidate(&mut self, symbol: &str) {
    self.cache.remove(symbol);
  }
}
