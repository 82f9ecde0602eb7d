//! Outbound HTTP transport shared by LLM providers and Http nodes

mod client;

pub use client::{ByteStream, HttpClient, HttpClientTrait};

#[cfg(test)]
pub use client::mock;
