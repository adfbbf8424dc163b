//! HTTP surface for DeepResearch: health, capability status and a
//! Server-Sent Events stream for each research run.

pub mod error;
pub mod routes;
pub mod state;
