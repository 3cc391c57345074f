//! Residential PV, battery and hot-water tank simulator.

pub mod config;
pub mod devices;
pub mod error;
/// Weekly weather and tariff forecasts.
pub mod forecast;
pub mod io;
/// Allocation, strategies, hot-water helpers, engine and KPIs.
pub mod sim;
pub mod weekly;
