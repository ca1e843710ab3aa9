//! Process-wide facade, layered configuration, and the optional Axum HTTP
//! front door for the AI gateway. The library surface (`facade` module) is
//! usable standalone; `http`/`apps-aigw` add the network-facing binary.

pub mod config;
pub mod facade;
pub mod http;

pub use config::{CliArgs, GatewayConfig};
pub use facade::build_orchestrator;
