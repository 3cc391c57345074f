//! Seven-day, forecast-aware orchestration on top of the daily engine.

use std::fmt;

use tracing::{debug, info};

use crate::devices::Device;
use crate::error::SimError;
use crate::forecast::{DAYS_PER_WEEK, WeeklyForecast, resample_hourly};
use crate::sim::allocation::Allocation;
use crate::sim::ecs::EcsServiceContract;
use crate::sim::engine::simulate;
use crate::sim::kpi::{KpiReport, ratio};
use crate::sim::strategy::{ForecastStrategy, Strategy, StrategyContext};
use crate::sim::types::{SimConfig, SimulationInput, SimulationResult, Totals};

/// Plain strategy that feeds a forecast-aware one a fresh 24-hour window
/// at every step of `day`.
pub struct ForecastBound<'a, F: ForecastStrategy + ?Sized> {
    strategy: &'a F,
    forecast: &'a WeeklyForecast,
    day: usize,
}

impl<'a, F: ForecastStrategy + ?Sized> ForecastBound<'a, F> {
    pub fn new(strategy: &'a F, forecast: &'a WeeklyForecast, day: usize) -> Self {
        Self {
            strategy,
            forecast,
            day,
        }
    }
}

impl<F: ForecastStrategy + ?Sized> Strategy for ForecastBound<'_, F> {
    fn allocate(&self, ctx: &StrategyContext) -> Vec<Allocation> {
        let window = self.forecast.window(self.day, ctx.time_h.floor() as usize);
        self.strategy.allocate(ctx, &window)
    }

    fn name(&self) -> &str {
        self.strategy.name()
    }

    fn derive_contract(&self, base: &EcsServiceContract) -> Option<EcsServiceContract> {
        self.strategy.derive_contract(base)
    }
}

/// Drives the engine through a week with persistent devices.
///
/// The orchestrator owns the device list for the whole week; each day's run
/// borrows it, so SOC and tank temperature carry over from one day to the
/// next. Comparing strategies needs one orchestrator per strategy.
#[derive(Debug, Clone)]
pub struct WeeklyOrchestrator {
    pub step_seconds: f64,
    pub devices: Vec<Device>,
    pub contract: EcsServiceContract,
    /// Hourly household consumption repeated every day (kW, 24 samples).
    pub base_load_kw: Vec<f64>,
    pub system_cost_eur: f64,
}

impl WeeklyOrchestrator {
    pub fn new(step_seconds: f64, devices: Vec<Device>, base_load_kw: Vec<f64>) -> Self {
        Self {
            step_seconds,
            devices,
            contract: EcsServiceContract::default(),
            base_load_kw,
            system_cost_eur: 0.0,
        }
    }

    pub fn with_contract(mut self, contract: EcsServiceContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_system_cost(mut self, system_cost_eur: f64) -> Self {
        self.system_cost_eur = system_cost_eur;
        self
    }

    /// Simulation input of `day`, resampled to the step size.
    pub fn day_input(
        &self,
        forecast: &WeeklyForecast,
        day: usize,
    ) -> Result<SimulationInput, SimError> {
        let config = SimConfig::new(self.step_seconds)?;
        let series = forecast.day_series(day, config.dt_hours);
        Ok(SimulationInput::new(
            self.step_seconds,
            series.pv_kw,
            resample_hourly(&self.base_load_kw, config.dt_hours),
        )
        .with_ambient(series.ambient_c)
        .with_prices(series.import_price, series.export_price)
        .with_contract(self.contract.clone())
        .with_system_cost(self.system_cost_eur))
    }

    /// Runs the seven days of `forecast` with `strategy`.
    ///
    /// # Errors
    ///
    /// Returns the first precondition failure of a daily run.
    pub fn run<F: ForecastStrategy + ?Sized>(
        &mut self,
        forecast: &WeeklyForecast,
        strategy: &F,
    ) -> Result<WeeklyResult, SimError> {
        let mut days = Vec::with_capacity(DAYS_PER_WEEK);
        for day in 0..DAYS_PER_WEEK {
            let input = self.day_input(forecast, day)?;
            let bound = ForecastBound::new(strategy, forecast, day);
            let result = simulate(&input, &mut self.devices, &bound)?;
            debug!(
                day,
                net_cost_eur = result.kpis.net_cost_eur,
                hit_rate = result.kpis.ecs_hit_rate,
                "day simulated"
            );
            days.push(result);
        }
        let week = WeeklyResult::from_days(strategy.name(), days, self.system_cost_eur);
        info!(
            strategy = %week.strategy,
            net_cost_eur = week.kpis.net_cost_eur,
            "week simulated"
        );
        Ok(week)
    }
}

/// Seven daily results and their weekly aggregate.
#[derive(Debug, Clone)]
pub struct WeeklyResult {
    pub strategy: String,
    pub days: Vec<SimulationResult>,
    /// Exact sum of the daily totals.
    pub totals: Totals,
    pub kpis: KpiReport,
}

impl WeeklyResult {
    /// Aggregates daily results.
    ///
    /// Energy and money add up; cycles, comfort deficits and penalties are
    /// summed; uptime is weighted by the number of samples; the hit rate is
    /// the mean of the daily hit rates.
    pub fn from_days(strategy: &str, days: Vec<SimulationResult>, system_cost_eur: f64) -> Self {
        let totals: Totals = days.iter().map(|d| &d.totals).sum();
        let steps: usize = days.iter().map(|d| d.records.len()).sum();
        let hours: f64 = days.iter().map(SimulationResult::hours).sum();

        let uptime_weighted: f64 = days
            .iter()
            .map(|d| d.kpis.ecs_uptime * d.records.len() as f64)
            .sum();
        let hit_rate = ratio(
            days.iter().map(|d| d.kpis.ecs_hit_rate).sum(),
            days.len() as f64,
        );
        let cycles = days.iter().map(|d| d.kpis.battery_cycles).sum();
        let deficit_k = days.iter().map(|d| d.kpis.ecs_deficit_k).sum();
        let penalty_eur = days.iter().map(|d| d.kpis.ecs_penalty_eur).sum();

        let kpis = KpiReport::from_totals(
            &totals,
            cycles,
            ratio(uptime_weighted, steps as f64),
            hit_rate,
            deficit_k,
            penalty_eur,
            hours,
            system_cost_eur,
        );

        Self {
            strategy: strategy.to_string(),
            days,
            totals,
            kpis,
        }
    }
}

/// Gains of a forecast-aware week over a baseline week.
///
/// Positive values favor the forecast-aware run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklyComparison {
    /// Reduction of the net cost including penalties (€).
    pub cost_gain_eur: f64,
    /// Same, relative to the baseline cost (%).
    pub cost_gain_pct: f64,
    /// Reduction of grid import (kWh).
    pub import_reduction_kwh: f64,
    pub import_reduction_pct: f64,
    /// Self-consumption difference (percentage points).
    pub self_consumption_gain_pts: f64,
    /// Hit-rate difference (percentage points).
    pub comfort_gain_pts: f64,
}

impl WeeklyComparison {
    pub fn between(baseline: &WeeklyResult, candidate: &WeeklyResult) -> Self {
        let base = &baseline.kpis;
        let cand = &candidate.kpis;
        let cost_gain_eur = base.net_cost_with_penalties_eur - cand.net_cost_with_penalties_eur;
        let import_reduction_kwh = baseline.totals.grid_import_kwh - candidate.totals.grid_import_kwh;
        Self {
            cost_gain_eur,
            cost_gain_pct: 100.0 * ratio(cost_gain_eur, base.net_cost_with_penalties_eur.abs()),
            import_reduction_kwh,
            import_reduction_pct: 100.0
                * ratio(import_reduction_kwh, baseline.totals.grid_import_kwh),
            self_consumption_gain_pts: 100.0 * (cand.self_consumption - base.self_consumption),
            comfort_gain_pts: 100.0 * (cand.ecs_hit_rate - base.ecs_hit_rate),
        }
    }
}

impl fmt::Display for WeeklyComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Weekly comparison ---")?;
        writeln!(
            f,
            "Cost gain:             {:.2} EUR ({:.1}%)",
            self.cost_gain_eur, self.cost_gain_pct
        )?;
        writeln!(
            f,
            "Import reduction:      {:.2} kWh ({:.1}%)",
            self.import_reduction_kwh, self.import_reduction_pct
        )?;
        writeln!(
            f,
            "Self-consumption gain: {:+.1} pts",
            self.self_consumption_gain_pts
        )?;
        write!(f, "Comfort gain:          {:+.1} pts", self.comfort_gain_pts)
    }
}
