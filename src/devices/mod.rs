//! Device models for the household energy system.

/// Home battery model.
pub mod battery;
/// Domestic hot-water tank model.
pub mod thermal_tank;
pub mod types;

// Re-export the main types for convenience
pub use battery::Battery;
pub use thermal_tank::ThermalTank;
pub use types::{
    Capability, Device, DeviceModel, DevicePlan, DeviceState, Environment, HelperAnnotations,
    Need, PowerOffer, PowerRequest,
};
