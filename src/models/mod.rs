pub mod execution;
pub mod order;
pub mod request;
