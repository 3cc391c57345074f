//! Priority-ordered distribution of surplus power.

use crate::error::SimError;

/// Remaining power below this value is treated as exhausted (kW).
pub const REMAINDER_EPSILON_KW: f64 = 1e-9;

/// Power a device would absorb if it were given everything it asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerDemand {
    pub device_id: String,
    pub kw: f64,
}

impl PowerDemand {
    pub fn new(device_id: impl Into<String>, kw: f64) -> Self {
        Self {
            device_id: device_id.into(),
            kw,
        }
    }
}

/// Power granted to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub device_id: String,
    pub kw: f64,
}

impl Allocation {
    pub fn new(device_id: impl Into<String>, kw: f64) -> Self {
        Self {
            device_id: device_id.into(),
            kw,
        }
    }
}

/// Distributes `available_kw` over `demands` following `priority_order`.
///
/// Each id in `priority_order` receives `min(demand, remaining)`; its demand
/// is 0 when absent or not positive. Ids that are not in the order never
/// receive power, and ordered ids with no demand are still reported with a
/// zero grant so results of different orders can be compared position by
/// position. An id repeated in the order is reported once.
///
/// # Errors
///
/// Returns [`SimError::NegativeAvailable`] if `available_kw` is negative or NaN.
///
/// # Examples
///
/// ```
/// use home_energy_sim::sim::allocation::{allocate, PowerDemand};
///
/// let demands = [PowerDemand::new("battery", 3.0), PowerDemand::new("ecs", 3.0)];
/// let grants = allocate(5.0, &demands, &["ecs", "battery"]).unwrap();
/// assert_eq!(grants[0].kw, 3.0);
/// assert_eq!(grants[1].kw, 2.0);
/// ```
pub fn allocate<S: AsRef<str>>(
    available_kw: f64,
    demands: &[PowerDemand],
    priority_order: &[S],
) -> Result<Vec<Allocation>, SimError> {
    if !(available_kw >= 0.0) {
        return Err(SimError::NegativeAvailable(available_kw));
    }

    let mut remaining = available_kw;
    let mut allocations: Vec<Allocation> = Vec::with_capacity(priority_order.len());

    for id in priority_order {
        let id = id.as_ref();
        if allocations.iter().any(|a| a.device_id == id) {
            continue;
        }

        let demand = demands
            .iter()
            .find(|d| d.device_id == id)
            .map_or(0.0, |d| d.kw);
        let demand = if demand > 0.0 { demand } else { 0.0 };

        let granted = demand.min(remaining);
        remaining -= granted;
        if remaining < REMAINDER_EPSILON_KW {
            remaining = 0.0;
        }
        allocations.push(Allocation::new(id, granted));
    }

    Ok(allocations)
}
