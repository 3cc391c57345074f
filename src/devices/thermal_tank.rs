use enumset::EnumSet;

use crate::devices::types::{
    Capability, DeviceModel, DevicePlan, DeviceState, Environment, Need, PowerRequest,
};

/// Heat capacity of water per litre (kWh/K).
pub const WATER_KWH_PER_LITRE_K: f64 = 4.186 / 3600.0;

/// Temperature gap below which the water counts as at a temperature (K).
pub const TEMPERATURE_EPSILON_K: f64 = 1e-9;

/// A domestic hot-water tank heated by an electric resistance element.
///
/// Lumped-capacitance model: one well-mixed water temperature, a linear
/// standby loss toward ambient, and an optional hourly draw profile.
/// The temperature never exceeds `target_c` and never drops below ambient.
#[derive(Debug, Clone)]
pub struct ThermalTank {
    pub id: String,
    pub label: String,
    /// Water volume in litres.
    pub volume_l: f64,
    /// Electrical rating of the heating element (kW).
    pub heating_power_kw: f64,
    /// Fraction of electrical power turned into water heat (0..1.0).
    pub efficiency: f64,
    /// Standby loss coefficient (W/K of water-to-ambient difference).
    pub loss_w_per_k: f64,
    /// Thermostat setpoint (°C).
    pub target_c: f64,
    /// Current water temperature (°C).
    pub temperature_c: f64,
    /// Thermal energy drawn by hot-water use, per hour of day (kWh/h).
    pub draw_kwh_per_hour: Vec<f64>,
}

impl ThermalTank {
    /// Creates a new tank.
    ///
    /// # Panics
    ///
    /// Panics if volume or heating power are not positive, efficiency is
    /// outside `(0, 1]`, or the loss coefficient is negative.
    pub fn new(
        id: impl Into<String>,
        volume_l: f64,
        heating_power_kw: f64,
        efficiency: f64,
        loss_w_per_k: f64,
        target_c: f64,
        temperature_c: f64,
    ) -> Self {
        assert!(volume_l > 0.0);
        assert!(heating_power_kw > 0.0);
        assert!(efficiency > 0.0 && efficiency <= 1.0);
        assert!(loss_w_per_k >= 0.0);

        let id = id.into();
        Self {
            label: id.clone(),
            id,
            volume_l,
            heating_power_kw,
            efficiency,
            loss_w_per_k,
            target_c,
            temperature_c: temperature_c.min(target_c),
            draw_kwh_per_hour: Vec::new(),
        }
    }

    /// Sets the human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the hourly hot-water draw profile (24 values, kWh thermal per hour).
    pub fn with_draw_profile(mut self, draw_kwh_per_hour: Vec<f64>) -> Self {
        self.draw_kwh_per_hour = draw_kwh_per_hour;
        self
    }

    /// Heat needed to warm the whole tank by one kelvin (kWh/K).
    pub fn heat_capacity_kwh_per_k(&self) -> f64 {
        self.volume_l * WATER_KWH_PER_LITRE_K
    }

    /// Standby loss at the current temperature (kW thermal, >= 0 above ambient).
    pub fn loss_kw(&self, ambient_c: f64) -> f64 {
        self.loss_w_per_k / 1000.0 * (self.temperature_c - ambient_c)
    }

    /// Hot-water draw at time of day `time_h` (kW thermal).
    pub fn draw_kw(&self, time_h: f64) -> f64 {
        if self.draw_kwh_per_hour.is_empty() {
            return 0.0;
        }
        let hour = time_h.rem_euclid(24.0).floor() as usize % self.draw_kwh_per_hour.len();
        self.draw_kwh_per_hour[hour].max(0.0)
    }

    /// Electrical power that exactly closes the temperature deficit within one
    /// step of `dt_hours`, compensating standby loss.
    ///
    /// Returns 0 when the tank is already at target. Not capped by the
    /// heating element rating.
    pub fn power_to_reach_target(&self, dt_hours: f64, ambient_c: f64) -> f64 {
        if !self.below(self.target_c) {
            return 0.0;
        }
        self.closing_power_kw(self.target_c, dt_hours, ambient_c, 0.0)
    }

    /// Same as [`ThermalTank::power_to_reach_target`], also covering the
    /// hot-water draw scheduled at time of day `time_h`.
    pub fn power_to_reach_target_at(&self, dt_hours: f64, ambient_c: f64, time_h: f64) -> f64 {
        if !self.below(self.target_c) {
            return 0.0;
        }
        self.closing_power_kw(self.target_c, dt_hours, ambient_c, self.draw_kw(time_h))
    }

    /// Power that leaves the water at `target_c` (capped at the thermostat)
    /// at the end of a step, so a tank already there is held against loss
    /// and the draw at `time_h`. 0 when the water stays at or above it
    /// unheated.
    pub fn power_to_hold_at(
        &self,
        target_c: f64,
        dt_hours: f64,
        ambient_c: f64,
        time_h: f64,
    ) -> f64 {
        self.closing_power_kw(target_c, dt_hours, ambient_c, self.draw_kw(time_h))
    }

    /// Whether the water is below `target_c` by more than rounding noise.
    pub fn below(&self, target_c: f64) -> bool {
        target_c - self.temperature_c > TEMPERATURE_EPSILON_K
    }

    fn closing_power_kw(&self, target_c: f64, dt_hours: f64, ambient_c: f64, draw_kw: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let gap_k = target_c.min(self.target_c) - self.temperature_c;
        let thermal_kwh =
            self.heat_capacity_kwh_per_k() * gap_k + (self.loss_kw(ambient_c) + draw_kw) * dt_hours;
        if thermal_kwh <= 0.0 {
            return 0.0;
        }
        thermal_kwh / (self.efficiency * dt_hours)
    }

    /// Forces the water to the thermostat setpoint and returns the electrical
    /// energy that takes (kWh).
    pub fn enforce_target_temperature(&mut self) -> f64 {
        self.enforce_temperature(self.target_c)
    }

    /// Forces the water up to `target_c`, never past the thermostat, and
    /// returns the electrical energy that takes (kWh). A tank already there
    /// is left alone and costs nothing.
    pub fn enforce_temperature(&mut self, target_c: f64) -> f64 {
        let target_c = target_c.min(self.target_c);
        if !self.below(target_c) {
            return 0.0;
        }
        let deficit_k = target_c - self.temperature_c;
        self.temperature_c = target_c;
        self.heat_capacity_kwh_per_k() * deficit_k / self.efficiency
    }
}

impl DeviceModel for ThermalTank {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn capabilities(&self) -> EnumSet<Capability> {
        Capability::ThermalStorage.into()
    }

    /// Requests heating only while the water is below target, never more
    /// than the element rating or than what reaches target this step.
    fn plan(&self, env: &Environment) -> DevicePlan {
        let needed_kw = self.power_to_reach_target_at(env.dt_hours, env.ambient_c, env.time_h);
        if needed_kw <= 0.0 {
            return DevicePlan::default();
        }
        DevicePlan {
            request: Some(PowerRequest::new(
                self.id.clone(),
                needed_kw.min(self.heating_power_kw),
                Need::Heating,
            )),
            offer: None,
        }
    }

    /// Integrates heat gain minus standby loss and draw over one step.
    fn apply(&mut self, power_kw: f64, env: &Environment) -> f64 {
        let dt = env.dt_hours;
        let actual_kw = power_kw.clamp(0.0, self.heating_power_kw);

        let gain_kwh = actual_kw * self.efficiency * dt;
        let loss_kwh = (self.loss_kw(env.ambient_c) + self.draw_kw(env.time_h)) * dt;
        let next_c = self.temperature_c + (gain_kwh - loss_kwh) / self.heat_capacity_kwh_per_k();

        let floor_c = env.ambient_c.min(self.target_c);
        self.temperature_c = next_c.min(self.target_c).max(floor_c);
        actual_kw
    }

    fn state(&self) -> DeviceState {
        DeviceState::ThermalTank {
            temperature_c: self.temperature_c,
            target_c: self.target_c,
        }
    }
}
