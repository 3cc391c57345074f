//! Hot-water (ECS) service contract and the helpers that shape tank requests.
//!
//! The helper sits between the devices' raw plans and the strategy. It keeps
//! one hysteresis latch per tank for the duration of a day and, inside the
//! preheat window before the comfort deadline, grants power to tanks directly
//! out of the current surplus.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::devices::{Device, Environment, PowerRequest};

use super::allocation::Allocation;
use super::clock::hours_until;

/// Smallest hysteresis band honored (K).
const MIN_BAND_K: f64 = 0.1;
/// Distance of the "stop heating" threshold below target (K).
const HIGH_THRESHOLD_OFFSET_K: f64 = 0.2;
/// Minimum gap kept between the two thresholds (K).
const MIN_THRESHOLD_GAP_K: f64 = 0.05;

/// What happens when a tank misses its comfort target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcsMode {
    /// Top the tank up from the grid at the end of the run.
    #[default]
    Force,
    /// Charge a comfort penalty per kelvin of shortfall at the deadline.
    Penalize,
    /// Report the shortfall only.
    Off,
}

impl EcsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EcsMode::Force => "force",
            EcsMode::Penalize => "penalize",
            EcsMode::Off => "off",
        }
    }
}

/// Comfort contract for domestic hot water, fixed for a run.
///
/// Partial TOML tables merge over [`EcsServiceContract::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcsServiceContract {
    pub mode: EcsMode,
    /// Comfort temperature (°C).
    pub target_c: f64,
    /// Hour of day by which the target must be reached (0..24).
    pub deadline_hour: f64,
    /// Penalty per kelvin of shortfall at the deadline (€/K).
    pub penalty_per_kelvin: f64,
    pub hysteresis_enabled: bool,
    /// Gap between the resume-heating threshold and the target (K).
    pub hysteresis_band_k: f64,
    pub deadline_enabled: bool,
    /// Hours before the deadline during which heating is forced.
    pub preheat_window_h: f64,
}

impl Default for EcsServiceContract {
    fn default() -> Self {
        Self {
            mode: EcsMode::Force,
            target_c: 55.0,
            deadline_hour: 21.0,
            penalty_per_kelvin: 0.08,
            hysteresis_enabled: true,
            hysteresis_band_k: 1.5,
            deadline_enabled: true,
            preheat_window_h: 1.0,
        }
    }
}

impl EcsServiceContract {
    /// Comfort target that applies to a tank with thermostat `tank_target_c`.
    pub fn effective_target_c(&self, tank_target_c: f64) -> f64 {
        self.target_c.min(tank_target_c)
    }

    /// Hysteresis thresholds `(low, high)` around `target_c`.
    ///
    /// Heating stops once the water reaches `high` and resumes only after it
    /// falls to `low`.
    pub fn hysteresis_thresholds(&self, target_c: f64) -> (f64, f64) {
        let low = target_c - self.hysteresis_band_k.max(MIN_BAND_K);
        let high = (target_c - HIGH_THRESHOLD_OFFSET_K).max(low + MIN_THRESHOLD_GAP_K);
        (low, high)
    }

    /// Returns `true` if `time_h` falls inside the preheat window.
    pub fn in_preheat_window(&self, time_h: f64) -> bool {
        let remaining = hours_until(time_h, self.deadline_hour);
        remaining > 0.0 && remaining <= self.preheat_window_h
    }
}

/// Requests, forced grants and residual surplus handed to the strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperOutcome {
    pub requests: Vec<PowerRequest>,
    /// Power granted by the deadline helper, applied before the strategy runs.
    pub forced: Vec<Allocation>,
    pub surplus_kw: f64,
}

/// Per-day hysteresis and deadline-preheat state.
#[derive(Debug, Clone, Default)]
pub struct EcsHelper {
    latches: BTreeMap<String, bool>,
}

impl EcsHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the hysteresis latch of `device_id` currently blocks heating.
    pub fn is_latched(&self, device_id: &str) -> bool {
        self.latches.get(device_id).copied().unwrap_or(false)
    }

    /// Shapes the raw requests of one step.
    ///
    /// # Arguments
    ///
    /// * `requests` - Requests proposed by the devices this step
    /// * `devices` - Devices of the run, read for tank temperatures
    /// * `env` - Shared environment of the step
    /// * `surplus_kw` - PV surplus before any controllable device is served
    /// * `contract` - Comfort contract in force
    ///
    /// # Returns
    ///
    /// The filtered requests, the forced grants and the surplus left for the
    /// strategy.
    pub fn process(
        &mut self,
        requests: Vec<PowerRequest>,
        devices: &[Device],
        env: &Environment,
        surplus_kw: f64,
        contract: &EcsServiceContract,
    ) -> HelperOutcome {
        let mut surplus_kw = surplus_kw.max(0.0);
        let mut forced = Vec::new();

        if contract.hysteresis_enabled {
            self.update_latches(devices, contract);
        }
        let in_window = contract.deadline_enabled && contract.in_preheat_window(env.time_h);

        // Inside the window every tank is held at its comfort target through
        // the end of the step, out of the current surplus.
        let mut urgent: BTreeMap<&str, f64> = BTreeMap::new();
        if in_window {
            for tank in devices.iter().filter_map(Device::as_thermal_tank) {
                let target_c = contract.effective_target_c(tank.target_c);
                let needed_kw =
                    tank.power_to_hold_at(target_c, env.dt_hours, env.ambient_c, env.time_h);
                if needed_kw <= 0.0 {
                    continue;
                }
                let granted_kw = needed_kw.min(tank.heating_power_kw).min(surplus_kw).max(0.0);
                if granted_kw > 0.0 {
                    surplus_kw -= granted_kw;
                    forced.push(Allocation::new(tank.id.clone(), granted_kw));
                }
                urgent.insert(&tank.id, granted_kw);
            }
        }

        let mut shaped = Vec::with_capacity(requests.len());
        for mut request in requests {
            if let Some(&granted_kw) = urgent.get(request.device_id.as_str()) {
                request.max_accept_kw = (request.max_accept_kw - granted_kw).max(0.0);
                request.annotations.forced_kw = granted_kw;
                request.annotations.deadline_urgent = true;
            } else if contract.hysteresis_enabled && self.is_latched(&request.device_id) {
                request.max_accept_kw = 0.0;
                request.annotations.hysteresis_blocked = true;
            }
            shaped.push(request);
        }

        HelperOutcome {
            requests: shaped,
            forced,
            surplus_kw,
        }
    }

    fn update_latches(&mut self, devices: &[Device], contract: &EcsServiceContract) {
        for tank in devices.iter().filter_map(Device::as_thermal_tank) {
            let target_c = contract.effective_target_c(tank.target_c);
            let (low, high) = contract.hysteresis_thresholds(target_c);
            let latch = self.latches.entry(tank.id.clone()).or_insert(false);
            if !*latch && tank.temperature_c >= high {
                *latch = true;
            } else if *latch && tank.temperature_c <= low {
                *latch = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceModel, ThermalTank};

    fn tank(temperature_c: f64) -> Device {
        ThermalTank::new("ecs", 200.0, 2.0, 1.0, 2.0, 55.0, temperature_c).into()
    }

    fn env_at(time_h: f64) -> Environment {
        let mut env = Environment::new(0, 0.25);
        env.time_h = time_h;
        env
    }

    fn raw_requests(devices: &[Device], env: &Environment) -> Vec<PowerRequest> {
        devices.iter().filter_map(|d| d.plan(env).request).collect()
    }

    #[test]
    fn default_contract_values() {
        let c = EcsServiceContract::default();
        assert_eq!(c.mode, EcsMode::Force);
        assert_eq!(c.target_c, 55.0);
        assert_eq!(c.deadline_hour, 21.0);
        assert_eq!(c.penalty_per_kelvin, 0.08);
        assert_eq!(c.hysteresis_band_k, 1.5);
        assert_eq!(c.preheat_window_h, 1.0);
    }

    #[test]
    fn partial_contract_merges_over_defaults() {
        let c: EcsServiceContract = toml::from_str("mode = \"penalize\"\ntarget_c = 50.0").unwrap();
        assert_eq!(c.mode, EcsMode::Penalize);
        assert_eq!(c.target_c, 50.0);
        assert_eq!(c.deadline_hour, 21.0);
        assert!(toml::from_str::<EcsServiceContract>("colour = 1").is_err());
    }

    #[test]
    fn thresholds_follow_band() {
        let c = EcsServiceContract::default();
        assert_eq!(c.hysteresis_thresholds(55.0), (53.5, 54.8));

        let narrow = EcsServiceContract {
            hysteresis_band_k: 0.0,
            ..Default::default()
        };
        let (low, high) = narrow.hysteresis_thresholds(55.0);
        assert!((low - 54.9).abs() < 1e-12);
        assert!((high - 54.95).abs() < 1e-12);
    }

    #[test]
    fn preheat_window_wraps_midnight() {
        let c = EcsServiceContract {
            deadline_hour: 0.5,
            ..Default::default()
        };
        assert!(c.in_preheat_window(23.75));
        assert!(c.in_preheat_window(0.25));
        assert!(!c.in_preheat_window(0.5));
        assert!(!c.in_preheat_window(22.0));
    }

    #[test]
    fn latch_blocks_until_low_threshold() {
        let contract = EcsServiceContract {
            deadline_enabled: false,
            ..Default::default()
        };
        let mut helper = EcsHelper::new();
        let env = env_at(10.0);

        let mut devices = vec![tank(54.9)];
        let out = helper.process(raw_requests(&devices, &env), &devices, &env, 5.0, &contract);
        assert!(helper.is_latched("ecs"));
        assert!(out.requests[0].annotations.hysteresis_blocked);
        assert_eq!(out.requests[0].max_accept_kw, 0.0);

        devices[0].as_thermal_tank_mut().unwrap().temperature_c = 54.0;
        let out = helper.process(raw_requests(&devices, &env), &devices, &env, 5.0, &contract);
        assert!(out.requests[0].annotations.hysteresis_blocked);

        devices[0].as_thermal_tank_mut().unwrap().temperature_c = 53.4;
        let out = helper.process(raw_requests(&devices, &env), &devices, &env, 5.0, &contract);
        assert!(!helper.is_latched("ecs"));
        assert!(out.requests[0].max_accept_kw > 0.0);
    }

    #[test]
    fn deadline_forces_power_from_surplus() {
        let contract = EcsServiceContract::default();
        let mut helper = EcsHelper::new();
        let env = env_at(20.5);
        let devices = vec![tank(45.0)];

        let out = helper.process(raw_requests(&devices, &env), &devices, &env, 1.5, &contract);
        assert_eq!(out.forced, vec![Allocation::new("ecs", 1.5)]);
        assert_eq!(out.surplus_kw, 0.0);
        let residual = &out.requests[0];
        assert!(residual.annotations.deadline_urgent);
        assert_eq!(residual.deadline_priority(), 0);
        assert!((residual.max_accept_kw - 0.5).abs() < 1e-12);
        assert_eq!(residual.annotations.forced_kw, 1.5);
    }

    #[test]
    fn deadline_heats_to_contract_target_only() {
        let contract = EcsServiceContract {
            target_c: 50.0,
            ..Default::default()
        };
        let env = env_at(20.5);

        // Far enough above the contract target to ride out one step of loss.
        let warm = vec![tank(52.0)];
        let out = EcsHelper::new().process(raw_requests(&warm, &env), &warm, &env, 5.0, &contract);
        assert!(out.forced.is_empty());
        assert!(!out.requests[0].annotations.deadline_urgent);

        let cold = vec![tank(48.0)];
        let out = EcsHelper::new().process(raw_requests(&cold, &env), &cold, &env, 5.0, &contract);
        let expected = cold[0]
            .as_thermal_tank()
            .unwrap()
            .power_to_hold_at(50.0, env.dt_hours, env.ambient_c, env.time_h);
        assert_eq!(out.forced, vec![Allocation::new("ecs", expected)]);
    }

    #[test]
    fn deadline_holds_tank_already_at_target() {
        let contract = EcsServiceContract::default();
        let env = env_at(20.75);
        let devices = vec![tank(55.0)];
        assert!(raw_requests(&devices, &env).is_empty());

        let out = EcsHelper::new().process(Vec::new(), &devices, &env, 3.0, &contract);
        assert_eq!(out.forced.len(), 1);
        assert!(out.forced[0].kw > 0.0 && out.forced[0].kw < 0.5);
        assert!((out.surplus_kw + out.forced[0].kw - 3.0).abs() < 1e-12);
    }

    #[test]
    fn deadline_overrides_latch() {
        let contract = EcsServiceContract::default();
        let mut helper = EcsHelper::new();
        let devices = vec![tank(54.9)];
        let morning = env_at(8.0);
        helper.process(raw_requests(&devices, &morning), &devices, &morning, 3.0, &contract);
        assert!(helper.is_latched("ecs"));

        let evening = env_at(20.75);
        let out = helper.process(raw_requests(&devices, &evening), &devices, &evening, 3.0, &contract);
        assert_eq!(out.forced.len(), 1);
        assert!(!out.requests[0].annotations.hysteresis_blocked);
    }

    #[test]
    fn outside_window_nothing_is_forced() {
        let contract = EcsServiceContract {
            hysteresis_enabled: false,
            ..Default::default()
        };
        let mut helper = EcsHelper::new();
        let env = env_at(12.0);
        let devices = vec![tank(45.0)];
        let out = helper.process(raw_requests(&devices, &env), &devices, &env, 3.0, &contract);
        assert!(out.forced.is_empty());
        assert_eq!(out.surplus_kw, 3.0);
        assert_eq!(out.requests[0].max_accept_kw, 2.0);
    }

    #[test]
    fn oscillating_trace_is_damped() {
        // Temperature bouncing just under target: every step would request heat.
        let trace = [54.7, 54.95, 54.6, 54.9, 54.5, 54.85, 54.4, 54.9, 53.4, 54.0];
        let env = env_at(10.0);

        let accepted = |contract: &EcsServiceContract| {
            let mut helper = EcsHelper::new();
            trace
                .iter()
                .filter(|&&t| {
                    let devices = vec![tank(t)];
                    let out =
                        helper.process(raw_requests(&devices, &env), &devices, &env, 5.0, contract);
                    out.requests.iter().any(|r| r.max_accept_kw > 0.0)
                })
                .count()
        };

        let damped = EcsServiceContract {
            deadline_enabled: false,
            ..Default::default()
        };
        let undamped = EcsServiceContract {
            hysteresis_enabled: false,
            ..damped.clone()
        };
        assert!(accepted(&damped) < accepted(&undamped));
    }
}
