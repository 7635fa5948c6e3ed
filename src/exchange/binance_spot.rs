use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ExecutionError;
use crate::exchange::traits::Exchange;
use crate::models::order::{
  OcoReport, OcoRequest, OrderId, OrderRecord, OrderRequest, OrderSide, OrderType, SymbolInfo,
};

type HmacSha256 = Hmac<Sha256>;

/// Binance order-not-found error code
const ORDER_NOT_FOUND_CODE: i64 = -2013;
/// Binance cancel of an unknown order
const CANCEL_REJECTED_CODE: i64 = -2011;

/// Binance Spot REST connector
pub struct BinanceSpotExchange {
  pub base_url: String,
  pub api_key: String,
  pub api_secret: String,
  pub recv_window: u64,
  pub http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrder {
  pub symbol: String,
  pub order_id: i64,
  #[serde(default)]
  pub price: Option<String>,
  #[serde(default)]
  pub executed_qty: Option<String>,
  #[serde(default)]
  pub cummulative_quote_qty: Option<String>,
  pub status: String,
  #[serde(rename = "type")]
  pub order_type: String,
  pub side: OrderSide,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOcoResponse {
  order_reports: Vec<BinanceOrder>,
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
  price: String,
}

#[derive(Debug, Deserialize)]
struct BinanceApiError {
  code: i64,
  msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
  symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
  symbol: String,
  filters: Vec<serde_json::Value>,
}

fn parse_num(value: Option<&str>) -> f64 {
  value.and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0)
}

impl BinanceOrder {
  pub fn into_record(self) -> Result<OrderRecord, ExecutionError> {
    let price = parse_num(self.price.as_deref());
    Ok(OrderRecord {
      order_id: OrderId(self.order_id.to_string()),
      symbol: self.symbol,
      side: self.side,
      order_type: self.order_type.parse()?,
      status: self.status.parse()?,
      price: if price > 0.0 { Some(price) } else { None },
      executed_quantity: parse_num(self.executed_qty.as_deref()),
      cumulative_quote_quantity: parse_num(self.cummulative_quote_qty.as_deref()),
    })
  }
}

/// exchangeInfo 응답에서 LOT_SIZE / PRICE_FILTER 추출
pub fn parse_symbol_info(symbol: &str, body: &str) -> Result<SymbolInfo, ExecutionError> {
  let info: ExchangeInfo = serde_json::from_str(body)?;
  symbol_info_from(symbol, info)
}

fn symbol_info_from(symbol: &str, info: ExchangeInfo) -> Result<SymbolInfo, ExecutionError> {
  let entry = info
    .symbols
    .into_iter()
    .find(|s| s.symbol == symbol)
    .ok_or_else(|| ExecutionError::exchange(format!("symbol not listed: {}", symbol)))?;

  let mut result = SymbolInfo::new(symbol, 0.0, 0.0);
  for filter in &entry.filters {
    let field = |name: &str| filter.get(name).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok());
    match filter.get("filterType").and_then(|v| v.as_str()) {
      Some("LOT_SIZE") => result.step_size = field("stepSize").unwrap_or(0.0),
      Some("PRICE_FILTER") => {
        result.tick_size = field("tickSize").unwrap_or(0.0);
        result.min_price = field("minPrice").filter(|p| *p > 0.0);
        result.max_price = field("maxPrice").filter(|p| *p > 0.0);
      }
      _ => {}
    }
  }

  if result.step_size <= 0.0 || result.tick_size <= 0.0 {
    return Err(ExecutionError::exchange(format!("missing LOT_SIZE/PRICE_FILTER for {}", symbol)));
  }
  Ok(result)
}

impl BinanceSpotExchange {
  pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
    BinanceSpotExchange {
      base_url: base_url.into(),
      api_key: api_key.into(),
      api_secret: api_secret.into(),
      recv_window: 5000,
      http: reqwest::Client::new(),
    }
  }

  fn timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
  }

  fn sign(&self, query: &str) -> Result<String, ExecutionError> {
    let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
      .map_err(|e| ExecutionError::Config(format!("invalid api secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
  }

  fn order_params(request: &OrderRequest) -> Vec<(String, String)> {
    let mut params = vec![
      ("symbol".to_string(), request.symbol.clone()),
      ("side".to_string(), request.side.as_str().to_string()),
      ("type".to_string(), request.order_type.as_str().to_string()),
      ("newOrderRespType".to_string(), "RESULT".to_string()),
    ];
    if let Some(q) = request.quantity { params.push(("quantity".into(), q.to_string())); }
    if let Some(p) = request.price { params.push(("price".into(), p.to_string())); }
    if let Some(s) = request.stop_price { params.push(("stopPrice".into(), s.to_string())); }
    if let Some(tif) = request.time_in_force { params.push(("timeInForce".into(), tif.as_str().to_string())); }
    if let Some(id) = &request.client_order_id { params.push(("newClientOrderId".into(), id.clone())); }
    params
  }

  async fn signed<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    mut params: Vec<(String, String)>,
    order_id: Option<&OrderId>,
  ) -> Result<T, ExecutionError> {
    params.push(("recvWindow".into(), self.recv_window.to_string()));
    params.push(("timestamp".into(), Self::timestamp_ms().to_string()));
    let query = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("&");
    let signature = self.sign(&query)?;
    let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

    let res = self.http
      .request(method, url)
      .header("X-MBX-APIKEY", &self.api_key)
      .send().await?;
    Self::decode(res, order_id).await
  }

  async fn public<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<T, ExecutionError> {
    let url = format!("{}{}?{}", self.base_url, path, query);
    let res = self.http.get(url).send().await?;
    Self::decode(res, None).await
  }

  async fn decode<T: DeserializeOwned>(res: reqwest::Response, order_id: Option<&OrderId>) -> Result<T, ExecutionError> {
    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
      return Ok(serde_json::from_str(&body)?);
    }

    match serde_json::from_str::<BinanceApiError>(&body) {
      Ok(err) if err.code == ORDER_NOT_FOUND_CODE || err.code == CANCEL_REJECTED_CODE => match order_id {
        Some(id) => Err(ExecutionError::OrderNotFound(id.clone())),
        None => Err(ExecutionError::exchange(err.msg)),
      },
      Ok(err) => Err(ExecutionError::exchange(format!("{} ({})", err.msg, err.code))),
      Err(_) => Err(ExecutionError::exchange(format!("http {}: {}", status, body))),
    }
  }
}

#[async_trait]
impl Exchange for BinanceSpotExchange {
  async fn create_order(&mut self, request: OrderRequest) -> Result<OrderRecord, ExecutionError> {
    let order: BinanceOrder = self
      .signed(Method::POST, "/api/v3/order", Self::order_params(&request), None)
      .await?;
    order.into_record()
  }

  async fn get_order(&self, symbol: &str, order_id: &OrderId) -> Result<OrderRecord, ExecutionError> {
    let params = vec![("symbol".into(), symbol.to_string()), ("orderId".into(), order_id.0.clone())];
    let order: BinanceOrder = self.signed(Method::GET, "/api/v3/order", params, Some(order_id)).await?;
    order.into_record()
  }

  async fn cancel_order(&mut self, symbol: &str, order_id: &OrderId) -> Result<(), ExecutionError> {
    let params = vec![("symbol".into(), symbol.to_string()), ("orderId".into(), order_id.0.clone())];
    let _: serde_json::Value = self.signed(Method::DELETE, "/api/v3/order", params, Some(order_id)).await?;
    Ok(())
  }

  async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExecutionError> {
    let info: ExchangeInfo = self.public("/api/v3/exchangeInfo", &format!("symbol={}", symbol)).await?;
    symbol_info_from(symbol, info)
  }

  async fn get_symbol_ticker(&self, symbol: &str) -> Result<f64, ExecutionError> {
    let ticker: BinanceTicker = self.public("/api/v3/ticker/price", &format!("symbol={}", symbol)).await?;
    ticker.price.parse::<f64>()
      .map_err(|e| ExecutionError::exchange(format!("ticker parse error: {}", e)))
  }

  async fn create_oco_order(&mut self, request: OcoRequest) -> Result<OcoReport, ExecutionError> {
    let params = vec![
      ("symbol".into(), request.symbol.clone()),
      ("side".into(), request.side.as_str().to_string()),
      ("quantity".into(), request.quantity.to_string()),
      ("price".into(), request.price.to_string()),
      ("stopPrice".into(), request.stop_price.to_string()),
      ("stopLimitPrice".into(), request.stop_limit_price.to_string()),
      ("stopLimitTimeInForce".into(), request.stop_limit_time_in_force.as_str().to_string()),
      ("newOrderRespType".into(), "RESULT".to_string()),
    ];
    let response: BinanceOcoResponse = self.signed(Method::POST, "/api/v3/order/oco", params, None).await?;
    let order_reports = response
      .order_reports
      .into_iter()
      .map(BinanceOrder::into_record)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(OcoReport { order_reports })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::order::{OrderStatus, TimeInForce};

  #[test]
  fn test_parse_order_response() {
    let body = r#"{
      "symbol": "BTCUSDT", "orderId": 28, "clientOrderId": "x-1", "transactTime": 1507725176595,
      "price": "50000.00000000", "origQty": "1.00000000", "executedQty": "0.40000000",
      "cummulativeQuoteQty": "20000.00000000", "status": "PARTIALLY_FILLED",
      "timeInForce": "GTC", "type": "LIMIT", "side": "BUY"
    }"#;
    let order: BinanceOrder = serde_json::from_str(body).unwrap();
    let record = order.into_record().unwrap();

    assert_eq!(record.order_id, OrderId("28".into()));
    assert_eq!(record.status, OrderStatus::PartiallyFilled);
    assert_eq!(record.order_type, OrderType::Limit);
    assert_eq!(record.executed_quantity, 0.4);
    assert_eq!(record.avg_fill_price(), Some(50000.0));
  }

  #[test]
  fn test_market_order_has_no_price() {
    let body = r#"{"symbol":"ETHUSDT","orderId":7,"price":"0.00000000","executedQty":"2.0",
      "cummulativeQuoteQty":"6000.0","status":"FILLED","type":"MARKET","side":"SELL"}"#;
    let record = serde_json::from_str::<BinanceOrder>(body).unwrap().into_record().unwrap();
    assert_eq!(record.price, None);
    assert_eq!(record.side, OrderSide::Sell);
  }

  #[test]
  fn test_parse_symbol_info_filters() {
    let body = r#"{"symbols":[{"symbol":"BTCUSDT","filters":[
      {"filterType":"PRICE_FILTER","minPrice":"0.01000000","maxPrice":"1000000.00000000","tickSize":"0.01000000"},
      {"filterType":"LOT_SIZE","minQty":"0.00001000","maxQty":"9000.00000000","stepSize":"0.00001000"},
      {"filterType":"NOTIONAL","minNotional":"5.00000000"}
    ]}]}"#;
    let info = parse_symbol_info("BTCUSDT", body).unwrap();

    assert_eq!(info.step_size, 0.00001);
    assert_eq!(info.tick_size, 0.01);
    assert_eq!(info.min_price, Some(0.01));
    assert_eq!(info.max_price, Some(1_000_000.0));
    assert!(parse_symbol_info("ETHUSDT", body).is_err());
  }

  #[test]
  fn test_order_params() {
    let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.25, 49000.5, TimeInForce::Gtc)
      .with_client_order_id("abc");
    let params = BinanceSpotExchange::order_params(&request);
    let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

    assert_eq!(get("type"), Some("LIMIT"));
    assert_eq!(get("quantity"), Some("0.25"));
    assert_eq!(get("price"), Some("49000.5"));
    assert_eq!(get("timeInForce"), Some("GTC"));
    assert_eq!(get("newClientOrderId"), Some("abc"));
    assert_eq!(get("stopPrice"), None);
  }

  #[test]
  fn test_signature_is_hex_sha256() {
    let exchange = BinanceSpotExchange::new("https://api.binance.com", "key", "secret");
    let sig = exchange.sign("symbol=BTCUSDT&timestamp=1").unwrap();
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
