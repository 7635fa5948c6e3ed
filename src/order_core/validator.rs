use crate::error::ExecutionError;
use crate::models::request::ExecutionRequest;

/// 실행 요청 검증기 인터페이스
pub trait RequestValidator: Send + Sync {
    /// 요청 검증. 실패 시 네트워크 호출 전에 중단
    fn validate(&self, request: &ExecutionRequest) -> Result<(), ExecutionError>;
}

/// 기본 요청 검증기
pub struct BasicRequestValidator {
    require_price: bool,
}

impl BasicRequestValidator {
    pub fn new(require_price: bool) -> Self {
        BasicRequestValidator { require_price }
    }

    /// 시장가 등 가격이 선택인 알고리즘용
    pub fn without_price() -> Self {
        Self::new(false)
    }

    /// 지정가 계열 알고리즘용
    pub fn with_price() -> Self {
        Self::new(true)
    }
}

impl RequestValidator for BasicRequestValidator {
    fn validate(&self, request: &ExecutionRequest) -> Result<(), ExecutionError> {
        // 심볼 검증
        if request.symbol.trim().is_empty() {
            return Err(ExecutionError::validation("symbol is required"));
        }

        // 수량 검증
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(ExecutionError::validation(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        // 가격 검증
        match request.price {
            Some(price) if !price.is_finite() || price <= 0.0 => Err(ExecutionError::validation(
                format!("price must be positive, got {}", price),
            )),
            None if self.require_price => Err(ExecutionError::validation("price is required")),
            _ => Ok(()),
        }
    }
}

/// 양수 유한값 검증 헬퍼
pub fn require_positive(name: &str, value: f64) -> Result<(), ExecutionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ExecutionError::validation(format!("{} must be positive, got {}", name, value)))
    }
}

/// 0 이상 유한값 검증 헬퍼
pub fn require_non_negative(name: &str, value: f64) -> Result<(), ExecutionError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ExecutionError::validation(format!("{} must not be negative, got {}", name, value)))
    }
}
