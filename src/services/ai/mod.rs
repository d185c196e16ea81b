//! AI gateway: prompt construction, provider retries and output validation

pub mod gateway;
pub mod prompts;
pub mod validator;

pub use gateway::{AiGateway, Exhausted, GatewayResponse, RetryPolicy};
