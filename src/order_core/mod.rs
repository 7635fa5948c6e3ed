//! 주문 요청 검증

pub mod validator;
