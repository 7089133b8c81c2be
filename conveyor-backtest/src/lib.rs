//! Deterministic backtest engine: replays OHLCV bar sequences against a [`Strategy`]
//! implementation and scores the result into a tiered [`PerformanceReport`].

mod config;
mod engine;
mod error;
mod fill;
mod provider;
mod report;
mod strategy;
mod types;

pub use config::EngineConfig;
pub use engine::BacktestEngine;
pub use error::{BacktestError, Result};
pub use fill::FillModel;
pub use provider::BarProvider;
pub use report::{classify, PerformanceReport, PerformanceThresholds, Tier, Verdict};
pub use strategy::Strategy;
pub use types::{Bar, ExitSignal, OpenPosition, Side, Signal, Trade};
