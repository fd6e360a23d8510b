//! Adapters for the hosted billing and LLM providers.

pub mod openai;
pub mod stripe;
