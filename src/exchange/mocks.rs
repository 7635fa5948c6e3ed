use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ExecutionError;
use crate::exchange::traits::Exchange;
use crate::models::order::{
    OcoReport, OcoRequest, OrderId, OrderRecord, OrderRequest, OrderSide, OrderStatus, OrderType,
    SymbolInfo, TimeInForce,
};
use crate::utils::math::floor_to_step;

/// How resting limit orders are filled on submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitFill {
    Full,
    None,
    Fraction(f64),
}

/// A create_order call seen by the mock, successful or rejected
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub request: OrderRequest,
    pub order_id: Option<OrderId>,
    pub at: Instant,
}

struct MockOrder {
    record: OrderRecord,
    quantity: f64,
}

/// A mock implementation of the Exchange trait for testing and development
pub struct MockExchange {
    symbols: HashMap<String, SymbolInfo>,
    prices: HashMap<String, f64>,
    orders: HashMap<OrderId, MockOrder>,
    submissions: Vec<SubmittedOrder>,
    cancel_requests: Vec<OrderId>,
    rejected_submissions: HashSet<usize>,
    forgotten: HashSet<OrderId>,
    limit_fill: LimitFill,
    delayed_market_fill: bool,
    fail_symbol_info: bool,
    symbol_info_calls: AtomicUsize,
    order_id_counter: u64,
}

impl MockExchange {
    pub fn new() -> Self {
        let mut exchange = Self {
            symbols: HashMap::new(),
            prices: HashMap::new(),
            orders: HashMap::new(),
            submissions: Vec::new(),
            cancel_requests: Vec::new(),
            rejected_submissions: HashSet::new(),
            forgotten: HashSet::new(),
            limit_fill: LimitFill::Full,
            delayed_market_fill: false,
            fail_symbol_info: false,
            symbol_info_calls: AtomicUsize::new(0),
            order_id_counter: 0,
        };

        // Initialize with some test data
        exchange.initialize_test_data();
        exchange
    }

    fn initialize_test_data(&mut self) {
        self.with_symbol(
            SymbolInfo::new("BTCUSDT", 0.001, 0.01).with_price_bounds(0.01, 1_000_000.0),
            50000.0,
        );
        self.with_symbol(
            SymbolInfo::new("ETHUSDT", 0.001, 0.01).with_price_bounds(0.01, 1_000_000.0),
            3000.0,
        );
    }

    pub fn with_symbol(&mut self, info: SymbolInfo, price: f64) -> &mut Self {
        self.prices.insert(info.symbol.clone(), price);
        self.symbols.insert(info.symbol.clone(), info);
        self
    }

    pub fn set_price(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }

    pub fn set_limit_fill(&mut self, fill: LimitFill) {
        self.limit_fill = fill;
    }

    /// Market orders report NEW on submission and FILLED on the next lookup
    pub fn set_delayed_market_fill(&mut self, delayed: bool) {
        self.delayed_market_fill = delayed;
    }

    /// Reject the n-th (0-based) create_order call
    pub fn reject_submission(&mut self, index: usize) {
        self.rejected_submissions.insert(index);
    }

    /// Make subsequent lookups of this order fail with OrderNotFound
    pub fn forget_order(&mut self, order_id: &OrderId) {
        self.forgotten.insert(order_id.clone());
    }

    pub fn set_fail_symbol_info(&mut self, fail: bool) {
        self.fail_symbol_info = fail;
    }

    /// Fill a resting order completely at its limit price
    pub fn fill_order(&mut self, order_id: &OrderId) {
        if let Some(order) = self.orders.get_mut(order_id) {
            let price = order.record.price.unwrap_or(0.0);
            order.record.status = OrderStatus::Filled;
            order.record.executed_quantity = order.quantity;
            order.record.cumulative_quote_quantity = order.quantity * price;
        }
    }

    pub fn submissions(&self) -> &[SubmittedOrder] {
        &self.submissions
    }

    pub fn accepted_orders(&self) -> Vec<&SubmittedOrder> {
        self.submissions.iter().filter(|s| s.order_id.is_some()).collect()
    }

    pub fn cancel_requests(&self) -> &[OrderId] {
        &self.cancel_requests
    }

    pub fn symbol_info_calls(&self) -> usize {
        self.symbol_info_calls.load(Ordering::SeqCst)
    }

    fn generate_order_id(&mut self) -> OrderId {
        self.order_id_counter += 1;
        OrderId(format!("mock-{}", self.order_id_counter))
    }

    fn check_submission(&mut self, request: &OrderRequest) -> Result<(), ExecutionError> {
        let index = self.submissions.len();
        let rejected = self.rejected_submissions.contains(&index);
        let known = self.symbols.contains_key(&request.symbol);

        self.submissions.push(SubmittedOrder {
            request: request.clone(),
            order_id: None,
            at: Instant::now(),
        });

        if rejected {
            return Err(ExecutionError::exchange("Filter failure: MIN_NOTIONAL"));
        }
        if !known {
            return Err(ExecutionError::exchange(format!("Invalid symbol: {}", request.symbol)));
        }
        Ok(())
    }

    // Simulates execution of an order
    fn process_order(&mut self, request: &OrderRequest) -> Result<(OrderRecord, f64), ExecutionError> {
        let quantity = request
            .quantity
            .ok_or_else(|| ExecutionError::exchange("quantity is required"))?;
        let step = self.symbols.get(&request.symbol).map(|s| s.step_size).unwrap_or(0.0);
        let last_price = self.prices.get(&request.symbol).copied().unwrap_or(0.0);

        let mut record = OrderRecord {
            order_id: self.generate_order_id(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::New,
            price: request.price,
            executed_quantity: 0.0,
            cumulative_quote_quantity: 0.0,
        };

        match request.order_type {
            OrderType::Market => {
                record.status = OrderStatus::Filled;
                record.executed_quantity = quantity;
                record.cumulative_quote_quantity = quantity * last_price;
            }
            OrderType::Limit | OrderType::LimitMaker => {
                let price = request
                    .price
                    .ok_or_else(|| ExecutionError::exchange("price is required"))?;
                let filled = match self.limit_fill {
                    LimitFill::Full => quantity,
                    LimitFill::None => 0.0,
                    LimitFill::Fraction(f) => floor_to_step(quantity * f, step),
                };

                record.executed_quantity = filled;
                record.cumulative_quote_quantity = filled * price;
                record.status = if filled >= quantity {
                    OrderStatus::Filled
                } else if filled > 0.0 {
                    OrderStatus::PartiallyFilled
                } else if matches!(request.time_in_force, Some(TimeInForce::Ioc) | Some(TimeInForce::Fok)) {
                    OrderStatus::Expired
                } else {
                    OrderStatus::New
                };
            }
            OrderType::StopLossLimit => {}
        }

        Ok((record, quantity))
    }

    fn store(&mut self, record: OrderRecord, quantity: f64) {
        if let Some(last) = self.submissions.last_mut() {
            last.order_id = Some(record.order_id.clone());
        }
        self.orders.insert(record.order_id.clone(), MockOrder { record, quantity });
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn create_order(&mut self, request: OrderRequest) -> Result<OrderRecord, ExecutionError> {
        self.check_submission(&request)?;
        let (record, quantity) = self.process_order(&request)?;
        self.store(record.clone(), quantity);

        if request.order_type == OrderType::Market && self.delayed_market_fill {
            let mut pending = record;
            pending.status = OrderStatus::New;
            pending.executed_quantity = 0.0;
            pending.cumulative_quote_quantity = 0.0;
            return Ok(pending);
        }

        Ok(record)
    }

    async fn get_order(&self, _symbol: &str, order_id: &OrderId) -> Result<OrderRecord, ExecutionError> {
        if self.forgotten.contains(order_id) {
            return Err(ExecutionError::OrderNotFound(order_id.clone()));
        }
        self.orders
            .get(order_id)
            .map(|o| o.record.clone())
            .ok_or_else(|| ExecutionError::OrderNotFound(order_id.clone()))
    }

    async fn cancel_order(&mut self, _symbol: &str, order_id: &OrderId) -> Result<(), ExecutionError> {
        self.cancel_requests.push(order_id.clone());

        match self.orders.get_mut(order_id) {
            Some(order) if order.record.status.is_open() => {
                order.record.status = OrderStatus::Canceled;
                Ok(())
            }
            Some(_) => Err(ExecutionError::exchange("Unknown order sent")),
            None => Err(ExecutionError::OrderNotFound(order_id.clone())),
        }
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, ExecutionError> {
        self.symbol_info_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_symbol_info {
            return Err(ExecutionError::exchange("exchangeInfo unavailable"));
        }
        self.symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::exchange(format!("Invalid symbol: {}", symbol)))
    }

    async fn get_symbol_ticker(&self, symbol: &str) -> Result<f64, ExecutionError> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExecutionError::exchange(format!("No price for {}", symbol)))
    }

    async fn create_oco_order(&mut self, request: OcoRequest) -> Result<OcoReport, ExecutionError> {
        let limit_leg = OrderRequest::limit_maker(&request.symbol, request.side, request.quantity, request.price);
        self.check_submission(&limit_leg)?;

        let (mut limit_record, quantity) = self.process_order(&limit_leg)?;
        limit_record.order_type = OrderType::LimitMaker;
        self.store(limit_record.clone(), quantity);

        let stop_record = OrderRecord {
            order_id: self.generate_order_id(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: OrderType::StopLossLimit,
            status: if limit_record.status == OrderStatus::Filled {
                OrderStatus::Expired
            } else {
                OrderStatus::New
            },
            price: Some(request.stop_limit_price),
            executed_quantity: 0.0,
            cumulative_quote_quantity: 0.0,
        };
        self.orders.insert(
            stop_record.order_id.clone(),
            MockOrder { record: stop_record.clone(), quantity: request.quantity },
        );

        Ok(OcoReport { order_reports: vec![limit_record, stop_record] })
    }
}
