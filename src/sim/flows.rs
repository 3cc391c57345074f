//! Reconstruction of directed energy flows from net powers.

use derive_more::{Add, AddAssign};

/// Energy moved along each household path during one step (kWh).
#[derive(Debug, Clone, Copy, Default, PartialEq, Add, AddAssign)]
pub struct FlowRecord {
    pub pv_to_load: f64,
    pub pv_to_ecs: f64,
    pub pv_to_battery: f64,
    pub pv_to_grid: f64,
    pub battery_to_load: f64,
    pub battery_to_ecs: f64,
    pub grid_to_load: f64,
    pub grid_to_ecs: f64,
}

impl FlowRecord {
    /// PV energy consumed directly by the household loads.
    pub fn pv_used_on_site(&self) -> f64 {
        self.pv_to_load + self.pv_to_ecs
    }

    /// Total PV energy leaving the panels.
    pub fn pv_total(&self) -> f64 {
        self.pv_used_on_site() + self.pv_to_battery + self.pv_to_grid
    }
}

/// Net powers of one step, all in kW.
///
/// `battery_kw` is positive while charging and negative while discharging;
/// the other quantities are non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetPowers {
    pub pv_kw: f64,
    pub base_load_kw: f64,
    pub ecs_kw: f64,
    pub battery_kw: f64,
}

impl NetPowers {
    /// Power drawn from the grid (kW).
    pub fn grid_import_kw(&self) -> f64 {
        self.net_kw().max(0.0)
    }

    /// Power sent to the grid (kW).
    pub fn grid_export_kw(&self) -> f64 {
        (-self.net_kw()).max(0.0)
    }

    fn net_kw(&self) -> f64 {
        self.base_load_kw + self.ecs_kw + self.battery_kw - self.pv_kw
    }
}

/// Splits one step's net powers into the eight directed flows.
///
/// PV serves the base load first, then the tank, then the battery; what is
/// left is exported. Battery discharge serves the remaining base load before
/// the tank, and the grid covers the rest.
///
/// # Arguments
///
/// * `p` - Net powers of the step
/// * `dt_hours` - Step duration
///
/// # Returns
///
/// The flows of the step in kWh.
pub fn reconstruct(p: &NetPowers, dt_hours: f64) -> FlowRecord {
    let pv = p.pv_kw.max(0.0);
    let load = p.base_load_kw.max(0.0);
    let ecs = p.ecs_kw.max(0.0);
    let charge = p.battery_kw.max(0.0);
    let discharge = (-p.battery_kw).max(0.0);

    let pv_to_load = pv.min(load);
    let mut pv_left = pv - pv_to_load;
    let pv_to_ecs = pv_left.min(ecs);
    pv_left -= pv_to_ecs;
    let pv_to_battery = pv_left.min(charge);
    pv_left -= pv_to_battery;

    let load_left = load - pv_to_load;
    let ecs_left = ecs - pv_to_ecs;
    let battery_to_load = discharge.min(load_left);
    let battery_to_ecs = (discharge - battery_to_load).min(ecs_left);

    FlowRecord {
        pv_to_load: pv_to_load * dt_hours,
        pv_to_ecs: pv_to_ecs * dt_hours,
        pv_to_battery: pv_to_battery * dt_hours,
        pv_to_grid: pv_left * dt_hours,
        battery_to_load: battery_to_load * dt_hours,
        battery_to_ecs: battery_to_ecs * dt_hours,
        grid_to_load: (load_left - battery_to_load) * dt_hours,
        grid_to_ecs: (ecs_left - battery_to_ecs) * dt_hours,
    }
}
