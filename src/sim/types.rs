//! Core simulation types: step size, run inputs, step records and totals.

use std::fmt;
use std::iter::Sum;

use derive_more::{Add, AddAssign};

use crate::devices::DeviceState;
use crate::devices::types::DEFAULT_AMBIENT_C;
use crate::error::SimError;

use super::ecs::EcsServiceContract;
use super::flows::FlowRecord;
use super::kpi::KpiReport;

/// Import price used when no price series is supplied (€/kWh).
pub const DEFAULT_IMPORT_PRICE: f64 = 0.25;
/// Export price used when no price series is supplied (€/kWh).
pub const DEFAULT_EXPORT_PRICE: f64 = 0.10;

/// Timing of a run.
///
/// # Examples
///
/// ```
/// use home_energy_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(900.0).unwrap();
/// assert_eq!(cfg.dt_hours, 0.25);
/// assert_eq!(cfg.steps_per_day(), 96);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Step duration in seconds.
    pub step_seconds: f64,
    /// Step duration in hours, derived as `step_seconds / 3600`.
    pub dt_hours: f64,
}

impl SimConfig {
    /// Creates a configuration for steps of `step_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidStepSize`] unless `step_seconds` is a
    /// positive finite number.
    pub fn new(step_seconds: f64) -> Result<Self, SimError> {
        if !(step_seconds.is_finite() && step_seconds > 0.0) {
            return Err(SimError::InvalidStepSize(step_seconds));
        }
        Ok(Self {
            step_seconds,
            dt_hours: step_seconds / 3600.0,
        })
    }

    /// Number of steps covering one day.
    pub fn steps_per_day(&self) -> usize {
        (24.0 / self.dt_hours).round().max(1.0) as usize
    }
}

/// Time series and contract describing one run.
///
/// `pv_kw` and `base_load_kw` must have the same length, which sets the
/// number of steps. Optional series shorter than that are filled forward.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationInput {
    pub step_seconds: f64,
    pub pv_kw: Vec<f64>,
    pub base_load_kw: Vec<f64>,
    pub ambient_c: Vec<f64>,
    pub import_price: Vec<f64>,
    pub export_price: Vec<f64>,
    pub contract: EcsServiceContract,
    /// Installed system cost used for the payback estimate (€).
    pub system_cost_eur: f64,
}

impl SimulationInput {
    pub fn new(step_seconds: f64, pv_kw: Vec<f64>, base_load_kw: Vec<f64>) -> Self {
        Self {
            step_seconds,
            pv_kw,
            base_load_kw,
            ambient_c: Vec::new(),
            import_price: Vec::new(),
            export_price: Vec::new(),
            contract: EcsServiceContract::default(),
            system_cost_eur: 0.0,
        }
    }

    pub fn with_ambient(mut self, ambient_c: Vec<f64>) -> Self {
        self.ambient_c = ambient_c;
        self
    }

    pub fn with_prices(mut self, import_price: Vec<f64>, export_price: Vec<f64>) -> Self {
        self.import_price = import_price;
        self.export_price = export_price;
        self
    }

    pub fn with_contract(mut self, contract: EcsServiceContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_system_cost(mut self, system_cost_eur: f64) -> Self {
        self.system_cost_eur = system_cost_eur;
        self
    }

    /// Number of steps, or an error if the PV and load series disagree.
    pub fn steps(&self) -> Result<usize, SimError> {
        if self.pv_kw.len() != self.base_load_kw.len() {
            return Err(SimError::SeriesLengthMismatch {
                pv: self.pv_kw.len(),
                base_load: self.base_load_kw.len(),
            });
        }
        Ok(self.pv_kw.len())
    }

    pub fn ambient_at(&self, step: usize) -> f64 {
        fill_forward(&self.ambient_c, step, DEFAULT_AMBIENT_C)
    }

    pub fn import_price_at(&self, step: usize) -> f64 {
        fill_forward(&self.import_price, step, DEFAULT_IMPORT_PRICE)
    }

    pub fn export_price_at(&self, step: usize) -> f64 {
        fill_forward(&self.export_price, step, DEFAULT_EXPORT_PRICE)
    }
}

/// Value of `series` at `step`, repeating the last sample past the end and
/// falling back to `default` for an empty series.
pub fn fill_forward(series: &[f64], step: usize, default: f64) -> f64 {
    series
        .get(step)
        .or_else(|| series.last())
        .copied()
        .unwrap_or(default)
}

/// Power and post-step state of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStep {
    pub device_id: String,
    /// Power actually exchanged (kW; positive consumed, negative supplied).
    pub power_kw: f64,
    pub state: DeviceState,
}

/// Complete record of one simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    /// Time of day at the start of the step (hours).
    pub time_h: f64,
    pub pv_kw: f64,
    pub base_load_kw: f64,
    /// Total power drawn by hot-water tanks (kW).
    pub ecs_kw: f64,
    /// Net battery power (kW; positive charging, negative discharging).
    pub battery_kw: f64,
    pub pv_used_on_site_kw: f64,
    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub import_price: f64,
    pub export_price: f64,
    /// Energy flows of the step (kWh).
    pub flows: FlowRecord,
    pub devices: Vec<DeviceStep>,
    /// Rescue energy billed on this step (kWh), non-zero only on a patched
    /// last step.
    pub rescue_kwh: f64,
}

impl StepRecord {
    /// State of `device_id` after the step.
    pub fn device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.devices
            .iter()
            .find(|d| d.device_id == device_id)
            .map(|d| d.state)
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>3} ({:>5.2}h) | pv={:>5.2} kW  load={:>5.2} kW  ecs={:>5.2} kW  \
             bat={:>6.2} kW | import={:>5.2} kW  export={:>5.2} kW",
            self.step,
            self.time_h,
            self.pv_kw,
            self.base_load_kw,
            self.ecs_kw,
            self.battery_kw,
            self.grid_import_kw,
            self.grid_export_kw,
        )?;
        for d in &self.devices {
            match d.state {
                DeviceState::Battery { soc, .. } => {
                    write!(f, " | {} SoC={:.1}%", d.device_id, soc * 100.0)?
                }
                DeviceState::ThermalTank { temperature_c, .. } => {
                    write!(f, " | {} T={:.1}°C", d.device_id, temperature_c)?
                }
            }
        }
        if self.rescue_kwh > 0.0 {
            write!(f, " | rescue={:.2} kWh", self.rescue_kwh)?;
        }
        Ok(())
    }
}

/// Cumulative energies and money over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Add, AddAssign)]
pub struct Totals {
    pub pv_kwh: f64,
    pub base_load_kwh: f64,
    pub ecs_kwh: f64,
    /// Base load plus hot-water heating (kWh).
    pub consumption_kwh: f64,
    pub pv_used_on_site_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
    /// Net energy into the batteries (kWh).
    pub battery_delta_kwh: f64,
    pub import_cost_eur: f64,
    pub export_revenue_eur: f64,
    /// Cost of buying every consumed kWh from the grid (€).
    pub grid_only_cost_eur: f64,
    pub ecs_rescue_kwh: f64,
    pub flows: FlowRecord,
}

impl Totals {
    /// Totals of a sequence of step records.
    pub fn from_records(records: &[StepRecord], dt_hours: f64) -> Self {
        records.iter().map(|r| Self::from_record(r, dt_hours)).sum()
    }

    fn from_record(r: &StepRecord, dt: f64) -> Self {
        let consumption_kwh = (r.base_load_kw + r.ecs_kw) * dt;
        let import_kwh = r.grid_import_kw * dt;
        let export_kwh = r.grid_export_kw * dt;
        Self {
            pv_kwh: r.pv_kw * dt,
            base_load_kwh: r.base_load_kw * dt,
            ecs_kwh: r.ecs_kw * dt,
            consumption_kwh,
            pv_used_on_site_kwh: r.flows.pv_used_on_site(),
            grid_import_kwh: import_kwh,
            grid_export_kwh: export_kwh,
            battery_charge_kwh: r.battery_kw.max(0.0) * dt,
            battery_discharge_kwh: (-r.battery_kw).max(0.0) * dt,
            battery_delta_kwh: r.battery_kw * dt,
            import_cost_eur: import_kwh * r.import_price,
            export_revenue_eur: export_kwh * r.export_price,
            grid_only_cost_eur: consumption_kwh * r.import_price,
            ecs_rescue_kwh: r.rescue_kwh,
            flows: r.flows,
        }
    }

    /// Import cost minus export revenue (€).
    pub fn net_cost_eur(&self) -> f64 {
        self.import_cost_eur - self.export_revenue_eur
    }
}

impl Sum for Totals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, t| acc + t)
    }
}

impl<'a> Sum<&'a Totals> for Totals {
    fn sum<I: Iterator<Item = &'a Totals>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Immutable outcome of a run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Name of the strategy that produced the run.
    pub strategy: String,
    pub dt_hours: f64,
    /// Contract the run was evaluated against.
    pub contract: EcsServiceContract,
    pub records: Vec<StepRecord>,
    /// Device states before the first step.
    pub initial_states: Vec<(String, DeviceState)>,
    pub totals: Totals,
    pub kpis: KpiReport,
}

impl SimulationResult {
    /// SOC (%) of battery `device_id` after each step.
    pub fn soc_series(&self, device_id: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.device_state(device_id)?.soc_pct())
            .collect()
    }

    /// Temperature (°C) of tank `device_id` after each step.
    pub fn temperature_series(&self, device_id: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.device_state(device_id)?.temperature_c())
            .collect()
    }

    /// Duration of the run in hours.
    pub fn hours(&self) -> f64 {
        self.records.len() as f64 * self.dt_hours
    }
}
