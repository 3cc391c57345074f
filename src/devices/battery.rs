use enumset::EnumSet;

use crate::devices::types::{
    Capability, DeviceModel, DevicePlan, DeviceState, Environment, Need, PowerOffer, PowerRequest,
};

/// Requests and offers below this magnitude are not worth proposing (kW).
const MIN_PROPOSAL_KW: f64 = 1e-9;

/// A home battery that charges from PV surplus and discharges into the deficit.
///
/// `Battery` models a battery with usable capacity, state-of-charge bounds,
/// charge/discharge efficiencies and a symmetric rated power. SOC is the only
/// mutable field and always stays within `[soc_min, soc_max]`.
///
/// # Power Flow Convention
/// - Positive power: Charging (consuming power)
/// - Negative power: Discharging (supplying power)
#[derive(Debug, Clone)]
pub struct Battery {
    /// Identifier, unique within a run.
    pub id: String,

    /// Human-readable label.
    pub label: String,

    /// Usable capacity in kilowatt-hours.
    pub capacity_kwh: f64,

    /// State of charge as a fraction of capacity.
    pub soc: f64,

    /// Lowest allowed state of charge.
    pub soc_min: f64,

    /// Highest allowed state of charge.
    pub soc_max: f64,

    /// Charging efficiency (0..1.0).
    pub eta_c: f64,

    /// Discharging efficiency (0..1.0).
    pub eta_d: f64,

    /// Rated charge and discharge power in kilowatts.
    pub max_power_kw: f64,

    /// Wear cost charged to every discharged kWh (€/kWh).
    pub wear_cost_per_kwh: f64,
}

impl Battery {
    /// Creates a new battery with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `id` - Device identifier
    /// * `capacity_kwh` - Usable capacity in kWh (must be > 0)
    /// * `soc` - Initial state of charge (within `[soc_min, soc_max]`)
    /// * `soc_min` - Lower SOC bound (0.0 to 1.0)
    /// * `soc_max` - Upper SOC bound (`soc_min` to 1.0)
    /// * `eta_c` - Charging efficiency (0..1.0)
    /// * `eta_d` - Discharging efficiency (0..1.0)
    /// * `max_power_kw` - Rated power in kW
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero/negative, SOC bounds are inconsistent, or
    /// efficiencies are invalid.
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        capacity_kwh: f64,
        soc: f64,
        soc_min: f64,
        soc_max: f64,
        eta_c: f64,
        eta_d: f64,
        max_power_kw: f64,
    ) -> Self {
        assert!(capacity_kwh > 0.0);
        assert!(0.0 <= soc_min && soc_min <= soc_max && soc_max <= 1.0);
        assert!((soc_min..=soc_max).contains(&soc));
        assert!(eta_c > 0.0 && eta_c <= 1.0);
        assert!(eta_d > 0.0 && eta_d <= 1.0);
        assert!(max_power_kw >= 0.0);

        let id = id.into();
        Self {
            label: id.clone(),
            id,
            capacity_kwh,
            soc,
            soc_min,
            soc_max,
            eta_c,
            eta_d,
            max_power_kw,
            wear_cost_per_kwh: 0.0,
        }
    }

    /// Sets the human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the wear cost used to rank this battery's discharge offer.
    pub fn with_wear_cost(mut self, wear_cost_per_kwh: f64) -> Self {
        self.wear_cost_per_kwh = wear_cost_per_kwh.max(0.0);
        self
    }

    /// Energy currently stored (kWh).
    pub fn stored_kwh(&self) -> f64 {
        self.soc * self.capacity_kwh
    }

    /// State of charge in percent.
    pub fn soc_pct(&self) -> f64 {
        self.soc * 100.0
    }

    /// Largest charging power that neither exceeds the rating nor overfills
    /// the battery within `dt_hours`.
    pub fn max_charge_kw(&self, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let headroom_kwh = (self.soc_max - self.soc).max(0.0) * self.capacity_kwh / self.eta_c;
        (headroom_kwh / dt_hours).min(self.max_power_kw)
    }

    /// Largest discharging power that neither exceeds the rating nor drains
    /// the battery below `soc_min` within `dt_hours`.
    pub fn max_discharge_kw(&self, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        let available_kwh = (self.soc - self.soc_min).max(0.0) * self.capacity_kwh * self.eta_d;
        (available_kwh / dt_hours).min(self.max_power_kw)
    }
}

impl DeviceModel for Battery {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn capabilities(&self) -> EnumSet<Capability> {
        Capability::ElectricalStorage.into()
    }

    /// Proposes a capacity-aware charge request and a discharge offer.
    fn plan(&self, env: &Environment) -> DevicePlan {
        let charge_kw = self.max_charge_kw(env.dt_hours);
        let discharge_kw = self.max_discharge_kw(env.dt_hours);

        DevicePlan {
            request: (charge_kw > MIN_PROPOSAL_KW)
                .then(|| PowerRequest::new(self.id.clone(), charge_kw, Need::Charging)),
            offer: (discharge_kw > MIN_PROPOSAL_KW).then(|| PowerOffer {
                device_id: self.id.clone(),
                max_supply_kw: discharge_kw,
                cost_penalty: self.wear_cost_per_kwh,
            }),
        }
    }

    /// Integrates SOC for the given power and returns the power actually exchanged.
    ///
    /// Enforces the power rating, SOC bounds and efficiency losses.
    fn apply(&mut self, power_kw: f64, env: &Environment) -> f64 {
        let dt = env.dt_hours;

        // Enforce kW limits
        let cmd_kw = power_kw.clamp(-self.max_power_kw, self.max_power_kw);

        if cmd_kw > 0.0 {
            // Charging — limit by remaining headroom
            let actual_kw = cmd_kw.min(self.max_charge_kw(dt));
            self.soc += actual_kw * dt * self.eta_c / self.capacity_kwh;
            self.soc = self.soc.clamp(self.soc_min, self.soc_max);
            actual_kw
        } else if cmd_kw < 0.0 {
            // Discharging — limit by stored energy above the floor
            let actual_abs_kw = (-cmd_kw).min(self.max_discharge_kw(dt));
            self.soc -= actual_abs_kw * dt / (self.capacity_kwh * self.eta_d);
            self.soc = self.soc.clamp(self.soc_min, self.soc_max);
            -actual_abs_kw
        } else {
            0.0
        }
    }

    fn state(&self) -> DeviceState {
        DeviceState::Battery {
            soc: self.soc,
            capacity_kwh: self.capacity_kwh,
        }
    }
}
