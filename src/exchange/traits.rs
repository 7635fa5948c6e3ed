use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ExecutionError;
use crate::models::order::{OcoReport, OcoRequest, OrderId, OrderRecord, OrderRequest, SymbolInfo};

/// The `Exchange` trait defines the trading API consumed by the execution engine.
/// It is implemented by real exchange connectors and mock implementations.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Submit a new order to the exchange
    async fn create_order(&mut self, request: OrderRequest) -> Result<OrderRecord, ExecutionError>;

    /// Query the current state of an order.
    /// Returns `ExecutionError::OrderNotFound` when the exchange no longer knows the order.
    async fn get_order(&self, symbol: &str, order_id: &OrderId) -> Result<OrderRecord, ExecutionError>;

    /// Cancel an existing order
    async fn cancel_order(&mut self, symbol: &str, order_id: &OrderId) -> Result<(), ExecutionError>;

    /// Get quantity step size and price tick size for a symbol
    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExecutionError>;

    /// Get the latest traded price for a symbol
    async fn get_symbol_ticker(&self, symbol: &str) -> Result<f64, ExecutionError>;

    /// Submit a paired limit + stop-limit order
    async fn create_oco_order(&mut self, request: OcoRequest) -> Result<OcoReport, ExecutionError>;
}

/// 실행기들이 공유하는 거래소 핸들
pub type SharedExchange = Arc<RwLock<dyn Exchange>>;
