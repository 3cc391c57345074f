//! Common types and traits for controllable household devices.

use enumset::{EnumSet, EnumSetType};

use super::battery::Battery;
use super::thermal_tank::ThermalTank;

/// Ambient temperature assumed when no ambient series is supplied (°C).
pub const DEFAULT_AMBIENT_C: f64 = 20.0;

/// Capability tags strategies branch on instead of concrete device types.
#[derive(Debug, EnumSetType)]
pub enum Capability {
    /// Stores heat (domestic hot-water tank).
    ThermalStorage,
    /// Stores electricity (home battery).
    ElectricalStorage,
}

/// Shared environment seen by every device during one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    /// Current timestep index.
    pub step: usize,
    /// Time of day at the start of the step (hours, `0.0..24.0`).
    pub time_h: f64,
    /// Duration of one timestep in hours.
    pub dt_hours: f64,
    /// PV production (kW, positive).
    pub pv_kw: f64,
    /// Uncontrollable household consumption (kW, positive).
    pub base_load_kw: f64,
    /// Ambient temperature around the devices (°C).
    pub ambient_c: f64,
    /// Grid import price (€/kWh).
    pub import_price: f64,
    /// Grid export price (€/kWh).
    pub export_price: f64,
}

impl Environment {
    /// Creates a quiet environment: no PV, no load, default ambient, free energy.
    pub fn new(step: usize, dt_hours: f64) -> Self {
        Self {
            step,
            time_h: (step as f64 * dt_hours).rem_euclid(24.0),
            dt_hours,
            pv_kw: 0.0,
            base_load_kw: 0.0,
            ambient_c: DEFAULT_AMBIENT_C,
            import_price: 0.0,
            export_price: 0.0,
        }
    }

    /// Returns a copy with the given ambient temperature.
    pub fn with_ambient(mut self, ambient_c: f64) -> Self {
        self.ambient_c = ambient_c;
        self
    }
}

/// What a device wants the power for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    /// Heat water toward the tank target.
    Heating,
    /// Store electricity.
    Charging,
}

/// Flags attached to a request by the ECS helpers.
///
/// Replaces a free-form state bag: helpers annotate requests without
/// touching the device they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperAnnotations {
    /// The hysteresis latch suppressed this request.
    pub hysteresis_blocked: bool,
    /// The deadline helper marked the residual request urgent.
    pub deadline_urgent: bool,
    /// Power already granted by the deadline helper this step (kW).
    pub forced_kw: f64,
}

/// A device's willingness to absorb surplus power this step.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerRequest {
    pub device_id: String,
    /// Maximum power the device accepts this step (kW, >= 0).
    pub max_accept_kw: f64,
    pub need: Need,
    /// Higher hints are served first within a strategy tier.
    pub priority_hint: Option<i32>,
    pub annotations: HelperAnnotations,
}

impl PowerRequest {
    pub fn new(device_id: impl Into<String>, max_accept_kw: f64, need: Need) -> Self {
        Self {
            device_id: device_id.into(),
            max_accept_kw: max_accept_kw.max(0.0),
            need,
            priority_hint: None,
            annotations: HelperAnnotations::default(),
        }
    }

    /// Resolved deadline priority: 0 when urgent, 1 otherwise.
    pub fn deadline_priority(&self) -> u8 {
        if self.annotations.deadline_urgent { 0 } else { 1 }
    }
}

/// A device's willingness to supply power toward the household deficit.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerOffer {
    pub device_id: String,
    /// Maximum power the device can supply this step (kW, >= 0).
    pub max_supply_kw: f64,
    /// Cost of using this offer (€/kWh); cheaper offers are drawn first.
    pub cost_penalty: f64,
}

/// A device's proposal for the current step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePlan {
    pub request: Option<PowerRequest>,
    pub offer: Option<PowerOffer>,
}

/// Snapshot of a device's mutable state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceState {
    Battery { soc: f64, capacity_kwh: f64 },
    ThermalTank { temperature_c: f64, target_c: f64 },
}

impl DeviceState {
    /// Energy stored in a battery (kWh), `None` for other devices.
    pub fn stored_kwh(&self) -> Option<f64> {
        match *self {
            DeviceState::Battery { soc, capacity_kwh } => Some(soc * capacity_kwh),
            DeviceState::ThermalTank { .. } => None,
        }
    }

    /// Battery state of charge in percent, `None` for other devices.
    pub fn soc_pct(&self) -> Option<f64> {
        match *self {
            DeviceState::Battery { soc, .. } => Some(soc * 100.0),
            DeviceState::ThermalTank { .. } => None,
        }
    }

    /// Tank temperature (°C), `None` for other devices.
    pub fn temperature_c(&self) -> Option<f64> {
        match *self {
            DeviceState::ThermalTank { temperature_c, .. } => Some(temperature_c),
            DeviceState::Battery { .. } => None,
        }
    }
}

/// Trait implemented by every controllable device model.
///
/// Devices never see each other: they propose a [`DevicePlan`] against the
/// shared [`Environment`], and the engine later hands them the power it
/// granted through [`DeviceModel::apply`].
pub trait DeviceModel {
    /// Stable identifier, unique within a run.
    fn id(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str;

    /// Capability tags of this device.
    fn capabilities(&self) -> EnumSet<Capability>;

    /// Proposes a request and/or an offer for the current step.
    fn plan(&self, env: &Environment) -> DevicePlan;

    /// Accepts power for one step and advances the device state.
    ///
    /// Positive power is consumed (charging, heating), negative power is
    /// supplied (discharging). Returns the power actually exchanged.
    fn apply(&mut self, power_kw: f64, env: &Environment) -> f64;

    /// Returns a snapshot of the current state.
    fn state(&self) -> DeviceState;
}

/// Closed set of device models simulated by the engine.
#[derive(Debug, Clone)]
pub enum Device {
    Battery(Battery),
    ThermalTank(ThermalTank),
}

impl Device {
    fn model(&self) -> &dyn DeviceModel {
        match self {
            Device::Battery(b) => b,
            Device::ThermalTank(t) => t,
        }
    }

    fn model_mut(&mut self) -> &mut dyn DeviceModel {
        match self {
            Device::Battery(b) => b,
            Device::ThermalTank(t) => t,
        }
    }

    /// Returns `true` if the device carries `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    pub fn as_battery(&self) -> Option<&Battery> {
        match self {
            Device::Battery(b) => Some(b),
            Device::ThermalTank(_) => None,
        }
    }

    pub fn as_thermal_tank(&self) -> Option<&ThermalTank> {
        match self {
            Device::ThermalTank(t) => Some(t),
            Device::Battery(_) => None,
        }
    }

    pub fn as_thermal_tank_mut(&mut self) -> Option<&mut ThermalTank> {
        match self {
            Device::ThermalTank(t) => Some(t),
            Device::Battery(_) => None,
        }
    }
}

impl DeviceModel for Device {
    fn id(&self) -> &str {
        self.model().id()
    }

    fn label(&self) -> &str {
        self.model().label()
    }

    fn capabilities(&self) -> EnumSet<Capability> {
        self.model().capabilities()
    }

    fn plan(&self, env: &Environment) -> DevicePlan {
        self.model().plan(env)
    }

    fn apply(&mut self, power_kw: f64, env: &Environment) -> f64 {
        self.model_mut().apply(power_kw, env)
    }

    fn state(&self) -> DeviceState {
        self.model().state()
    }
}

impl From<Battery> for Device {
    fn from(battery: Battery) -> Self {
        Device::Battery(battery)
    }
}

impl From<ThermalTank> for Device {
    fn from(tank: ThermalTank) -> Self {
        Device::ThermalTank(tank)
    }
}
