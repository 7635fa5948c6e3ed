/**
* filename : error
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use thiserror::Error;

use crate::models::order::OrderId;

/// 실행 엔진 오류
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// 오류 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Exchange,
    Lookup,
    Timeout,
    Internal,
}

impl ExecutionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ExecutionError::Validation(msg.into())
    }

    pub fn exchange(msg: impl Into<String>) -> Self {
        ExecutionError::Exchange(msg.into())
    }

    /// 오류를 분류 체계에 매핑
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Validation(_) => ErrorKind::Validation,
            ExecutionError::Exchange(_) | ExecutionError::Http(_) => ErrorKind::Exchange,
            ExecutionError::OrderNotFound(_) => ErrorKind::Lookup,
            ExecutionError::Timeout(_) => ErrorKind::Timeout,
            ExecutionError::Config(_)
            | ExecutionError::Io(_)
            | ExecutionError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_lookup(&self) -> bool {
        self.kind() == ErrorKind::Lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(ExecutionError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(ExecutionError::exchange("x").kind(), ErrorKind::Exchange);
        assert!(ExecutionError::OrderNotFound(OrderId("1".into())).is_lookup());
        assert_eq!(ExecutionError::Timeout("x".into()).kind(), ErrorKind::Timeout);
    }
}
