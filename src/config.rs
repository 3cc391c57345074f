//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::devices::{Battery, Device, ThermalTank};
use crate::error::SimError;
use crate::forecast::{ForecastOptions, ForecastProvider, SyntheticForecast, WeeklyForecast};
use crate::sim::ecs::EcsServiceContract;
use crate::sim::strategy::{DEFAULT_SOC_THRESHOLD_PCT, PriorityPolicy, STRATEGY_IDS};
use crate::weekly::WeeklyOrchestrator;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Timing, strategy and run mode.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Synthetic weather, tariff and load generator.
    #[serde(default)]
    pub profile: ForecastOptions,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub tank: TankConfig,
    /// Hot-water comfort contract; partial tables merge over the defaults.
    #[serde(default)]
    pub ecs: EcsServiceContract,
    #[serde(default)]
    pub economics: EconomicsConfig,
}

/// Timing, strategy and run mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Step duration in seconds (must be > 0).
    pub step_seconds: f64,
    /// Strategy id, one of [`STRATEGY_IDS`].
    pub strategy: String,
    /// SOC threshold of the `mix_soc` strategy (%).
    pub soc_threshold_pct: f64,
    /// Run the seven-day forecast-aware comparison instead of a single day.
    pub weekly: bool,
    /// Day of year of the first simulated day (1..=366).
    pub start_day: u32,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_seconds: 900.0,
            strategy: "ecs_first".to_string(),
            soc_threshold_pct: DEFAULT_SOC_THRESHOLD_PCT,
            weekly: false,
            start_day: 172,
            seed: 42,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    pub enabled: bool,
    /// Usable capacity (kWh).
    pub capacity_kwh: f64,
    /// Initial state of charge (0.0–1.0).
    pub initial_soc: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    /// Charge efficiency (0.0–1.0).
    pub eta_charge: f64,
    /// Discharge efficiency (0.0–1.0).
    pub eta_discharge: f64,
    /// Rated charge and discharge power (kW).
    pub max_power_kw: f64,
    /// Wear cost of discharged energy (€/kWh).
    pub wear_cost_per_kwh: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_kwh: 10.0,
            initial_soc: 0.5,
            soc_min: 0.1,
            soc_max: 0.95,
            eta_charge: 0.95,
            eta_discharge: 0.95,
            max_power_kw: 3.0,
            wear_cost_per_kwh: 0.02,
        }
    }
}

/// Hot-water tank parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TankConfig {
    pub enabled: bool,
    pub volume_l: f64,
    /// Heating element rating (kW).
    pub heating_power_kw: f64,
    pub efficiency: f64,
    /// Standby loss coefficient (W/K).
    pub loss_w_per_k: f64,
    /// Thermostat setpoint (°C).
    pub target_c: f64,
    /// Water temperature at the start of the run (°C).
    pub initial_c: f64,
    /// Hot-water use per day (kWh thermal), 0 for none.
    pub draw_kwh_per_day: f64,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume_l: 200.0,
            heating_power_kw: 2.0,
            efficiency: 0.95,
            loss_w_per_k: 2.0,
            target_c: 55.0,
            initial_c: 45.0,
            draw_kwh_per_day: 0.0,
        }
    }
}

/// Economic parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomicsConfig {
    /// Installed cost of PV, battery and controls (€).
    pub system_cost_eur: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            system_cost_eur: 9000.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.step_seconds"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: ecs-first over a summer day.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the battery-first preset with a larger battery.
    pub fn battery_first() -> Self {
        Self {
            simulation: SimulationConfig {
                strategy: "battery_first".to_string(),
                ..SimulationConfig::default()
            },
            battery: BatteryConfig {
                capacity_kwh: 13.5,
                initial_soc: 0.3,
                max_power_kw: 5.0,
                ..BatteryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the penalize preset: comfort misses cost money instead of
    /// being rescued, with daily hot-water use and no deadline preheat.
    pub fn penalize() -> Self {
        Self {
            simulation: SimulationConfig {
                strategy: "mix_soc".to_string(),
                ..SimulationConfig::default()
            },
            tank: TankConfig {
                draw_kwh_per_day: 6.0,
                ..TankConfig::default()
            },
            ecs: EcsServiceContract {
                mode: crate::sim::ecs::EcsMode::Penalize,
                deadline_enabled: false,
                penalty_per_kelvin: 0.15,
                ..EcsServiceContract::default()
            },
            ..Self::default()
        }
    }

    /// Returns the weekly preset: a spring week with Tempo tariffs, compared
    /// against the reactive baseline.
    pub fn weekly_mpc() -> Self {
        Self {
            simulation: SimulationConfig {
                weekly: true,
                start_day: 91,
                ..SimulationConfig::default()
            },
            profile: ForecastOptions {
                tempo: true,
                pv_peak_kw: 5.0,
                ..ForecastOptions::default()
            },
            tank: TankConfig {
                draw_kwh_per_day: 5.0,
                ..TankConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "battery_first", "penalize", "weekly_mpc"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "battery_first" => Ok(Self::battery_first()),
            "penalize" => Ok(Self::penalize()),
            "weekly_mpc" => Ok(Self::weekly_mpc()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(
            s.step_seconds.is_finite() && s.step_seconds > 0.0,
            "simulation.step_seconds",
            "must be > 0",
        );
        check(
            STRATEGY_IDS.contains(&s.strategy.as_str()),
            "simulation.strategy",
            "must be one of ecs_first, battery_first, mix_soc",
        );
        check(
            (0.0..=100.0).contains(&s.soc_threshold_pct),
            "simulation.soc_threshold_pct",
            "must be in [0, 100]",
        );
        check(
            (1..=366).contains(&s.start_day),
            "simulation.start_day",
            "must be in [1, 366]",
        );

        let p = &self.profile;
        check(p.pv_peak_kw >= 0.0, "profile.pv_peak_kw", "must be >= 0");
        check(p.base_load_kw >= 0.0, "profile.base_load_kw", "must be >= 0");
        check(
            p.peak_load_kw >= p.base_load_kw,
            "profile.peak_load_kw",
            "must be >= profile.base_load_kw",
        );

        let b = &self.battery;
        if b.enabled {
            check(b.capacity_kwh > 0.0, "battery.capacity_kwh", "must be > 0");
            check(
                0.0 <= b.soc_min && b.soc_min <= b.soc_max && b.soc_max <= 1.0,
                "battery.soc_min",
                "must satisfy 0 <= soc_min <= soc_max <= 1",
            );
            check(
                (b.soc_min..=b.soc_max).contains(&b.initial_soc),
                "battery.initial_soc",
                "must be in [soc_min, soc_max]",
            );
            check(
                b.eta_charge > 0.0 && b.eta_charge <= 1.0,
                "battery.eta_charge",
                "must be in (0, 1]",
            );
            check(
                b.eta_discharge > 0.0 && b.eta_discharge <= 1.0,
                "battery.eta_discharge",
                "must be in (0, 1]",
            );
            check(b.max_power_kw >= 0.0, "battery.max_power_kw", "must be >= 0");
        }

        let t = &self.tank;
        if t.enabled {
            check(t.volume_l > 0.0, "tank.volume_l", "must be > 0");
            check(t.heating_power_kw > 0.0, "tank.heating_power_kw", "must be > 0");
            check(
                t.efficiency > 0.0 && t.efficiency <= 1.0,
                "tank.efficiency",
                "must be in (0, 1]",
            );
            check(t.loss_w_per_k >= 0.0, "tank.loss_w_per_k", "must be >= 0");
            check(t.draw_kwh_per_day >= 0.0, "tank.draw_kwh_per_day", "must be >= 0");
        }

        let e = &self.ecs;
        check(
            (0.0..24.0).contains(&e.deadline_hour),
            "ecs.deadline_hour",
            "must be in [0, 24)",
        );
        check(e.penalty_per_kelvin >= 0.0, "ecs.penalty_per_kelvin", "must be >= 0");
        check(e.hysteresis_band_k >= 0.0, "ecs.hysteresis_band_k", "must be >= 0");
        check(e.preheat_window_h >= 0.0, "ecs.preheat_window_h", "must be >= 0");

        check(
            self.economics.system_cost_eur >= 0.0,
            "economics.system_cost_eur",
            "must be >= 0",
        );

        errors
    }

    /// Builds the enabled devices. Call after [`ScenarioConfig::validate`].
    ///
    /// # Panics
    ///
    /// Panics if device parameters are invalid.
    pub fn build_devices(&self) -> Vec<Device> {
        let mut devices = Vec::new();
        let b = &self.battery;
        if b.enabled {
            let battery = Battery::new(
                "battery",
                b.capacity_kwh,
                b.initial_soc,
                b.soc_min,
                b.soc_max,
                b.eta_charge,
                b.eta_discharge,
                b.max_power_kw,
            )
            .with_label("Home battery")
            .with_wear_cost(b.wear_cost_per_kwh);
            devices.push(battery.into());
        }
        let t = &self.tank;
        if t.enabled {
            let tank = ThermalTank::new(
                "ecs",
                t.volume_l,
                t.heating_power_kw,
                t.efficiency,
                t.loss_w_per_k,
                t.target_c,
                t.initial_c,
            )
            .with_label("Hot-water tank")
            .with_draw_profile(SyntheticForecast::draw_profile(t.draw_kwh_per_day));
            devices.push(tank.into());
        }
        devices
    }

    /// Strategy selected by `simulation.strategy`.
    pub fn strategy(&self) -> PriorityPolicy {
        PriorityPolicy::from_id(&self.simulation.strategy, self.simulation.soc_threshold_pct)
    }

    /// Synthetic forecast of the week starting on `simulation.start_day`.
    ///
    /// # Errors
    ///
    /// Propagates forecast shape errors.
    pub fn forecast(&self) -> Result<WeeklyForecast, SimError> {
        SyntheticForecast::new(self.simulation.seed)
            .weekly_forecast(self.simulation.start_day, &self.profile)
    }

    /// Orchestrator over a fresh set of devices.
    pub fn orchestrator(&self) -> WeeklyOrchestrator {
        WeeklyOrchestrator::new(
            self.simulation.step_seconds,
            self.build_devices(),
            SyntheticForecast::base_load_profile(&self.profile),
        )
        .with_contract(self.ecs.clone())
        .with_system_cost(self.economics.system_cost_eur)
    }
}
