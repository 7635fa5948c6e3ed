//! 주문 실행 알고리즘의 핵심 구현체

pub mod executor;
pub mod executor_factory;
pub mod iceberg_executor;
pub mod limit_executor;
pub mod market_executor;
pub mod oco_executor;
pub mod order_monitor;
pub mod quantizer;
pub mod recommender;
pub mod scaled_executor;
pub mod twap_executor;

pub use executor::{ExecutionContext, Executor};
pub use executor_factory::{create_executor, ExecutorFactory, ExecutorParams};
pub use iceberg_executor::{IcebergOrderExecutor, IcebergParams};
pub use limit_executor::{LimitOrderExecutor, LimitParams};
pub use market_executor::MarketOrderExecutor;
pub use oco_executor::{OcoOrderExecutor, OcoParams};
pub use order_monitor::{MonitorOutcome, OrderMonitor};
pub use quantizer::Quantizer;
pub use recommender::{recommend, MarketConditions};
pub use scaled_executor::{Distribution, ScaledOrderExecutor, ScaledParams};
pub use twap_executor::{TwapExecutor, TwapParams, TwapStopHandle};
