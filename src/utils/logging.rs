//! 로깅 유틸리티
//!
//! 로그 초기화 및 실행 이벤트 로그 함수 제공

use env_logger::Builder;
use log::LevelFilter;
use std::env;

use crate::error::ExecutionError;
use crate::models::execution::ExecutionState;
use crate::models::order::OrderRecord;

/// 로깅 시스템 초기화
pub fn init(default_level: &str) -> Result<(), ExecutionError> {
    let mut builder = Builder::from_default_env();

    // RUST_LOG 환경변수가 설정 파일보다 우선
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());

    let level_filter = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };

    builder
      .filter_level(level_filter)
      .format_timestamp_millis()
      .try_init()
      .map_err(|e| ExecutionError::Config(format!("logger init failed: {}", e)))?;

    log::info!("로깅 시스템 초기화 완료: 레벨 = {}", log_level);

    Ok(())
}

/// 실행 시작 로그
pub fn log_execution_start(state: &ExecutionState) {
    log::info!("실행 시작: {} - 심볼: {} - 방향: {} - 수량: {}",
               state.algorithm, state.symbol, state.side, state.requested_quantity);
}

/// 실행 종료 로그
pub fn log_execution_end(state: &ExecutionState) {
    log::info!("실행 종료: {} - 심볼: {} - 상태: {} - 체결: {}/{} - 평균가: {:.8} - 슬리피지: {:.4}%",
               state.algorithm, state.symbol, state.status, state.filled_quantity,
               state.requested_quantity, state.avg_price, state.slippage);
}

/// 주문 제출 로그
pub fn log_order_submitted(record: &OrderRecord, quantity: f64, price: Option<f64>) {
    match price {
        Some(price) => log::info!("주문 제출: {} - 심볼: {} - 유형: {} - 방향: {} - 수량: {} - 가격: {}",
                                  record.order_id, record.symbol, record.order_type.as_str(),
                                  record.side, quantity, price),
        None => log::info!("주문 제출: {} - 심볼: {} - 유형: {} - 방향: {} - 수량: {}",
                           record.order_id, record.symbol, record.order_type.as_str(),
                           record.side, quantity),
    }
}

/// 주문 취소 로그
pub fn log_order_canceled(order_id: &str) {
    log::info!("주문 취소: {}", order_id);
}

/// 주문 체결 로그
pub fn log_order_filled(record: &OrderRecord) {
    log::info!("주문 체결: {} - 심볼: {} - 수량: {} - 금액: {}",
               record.order_id, record.symbol, record.executed_quantity,
               record.cumulative_quote_quantity);
}

/// 오류 로그
pub fn log_error(context: &str, error: &ExecutionError) {
    log::error!("오류 발생 - {}: {}", context, error);
}
