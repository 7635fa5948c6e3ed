//! 주문 실행 엔진 라이브러리
//!
//! 하나의 거래 요청을 시장가, 지정가, Iceberg, TWAP, Scaled, OCO 알고리즘으로
//! 거래소 주문으로 나눠 실행하고 체결 상태를 집계합니다.

pub mod config;
pub mod core;
pub mod error;
pub mod exchange;
pub mod models;
pub mod order_core;
pub mod utils;

// 핵심 타입 재노출
pub use crate::core::{create_executor, recommend, Executor, ExecutorFactory, ExecutorParams};
pub use crate::error::{ErrorKind, ExecutionError};
pub use crate::exchange::traits::{Exchange, SharedExchange};
pub use crate::models::execution::{ExecutionAlgorithm, ExecutionState, ExecutionStatus};
pub use crate::models::order::{OrderId, OrderSide, OrderStatus, OrderType};
pub use crate::models::request::ExecutionRequest;

/// 버전 정보
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 결과 타입 별칭
pub type Result<T> = std::result::Result<T, ExecutionError>;
