//! Post-hoc KPI computation from simulation records.

use std::fmt;

use crate::devices::DeviceState;
use crate::devices::thermal_tank::TEMPERATURE_EPSILON_K;

use super::ecs::{EcsMode, EcsServiceContract};
use super::types::{StepRecord, Totals};

/// Hours in a year, used to annualize savings.
const HOURS_PER_YEAR: f64 = 8760.0;

/// Aggregate key performance indicators derived from a complete run.
///
/// Computed post-hoc from the step records so reported metrics always agree
/// with the step data. Every ratio is 0 for empty or zero input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiReport {
    /// PV used on site over household consumption (0..1).
    pub self_consumption: f64,
    /// PV used on site over total PV production (0..1).
    pub self_production: f64,
    /// Battery equivalent full cycles.
    pub battery_cycles: f64,
    /// Fraction of tank samples at or above the comfort target (0..1).
    pub ecs_uptime: f64,
    /// Fraction of tanks at target at the deadline (0..1).
    pub ecs_hit_rate: f64,
    /// Shortfall below target at the deadline, summed over tanks (K).
    pub ecs_deficit_k: f64,
    /// Comfort penalty (€), non-zero only in penalize mode.
    pub ecs_penalty_eur: f64,
    /// Energy injected by the end-of-run rescue (kWh).
    pub ecs_rescue_kwh: f64,
    pub import_cost_eur: f64,
    pub export_revenue_eur: f64,
    pub net_cost_eur: f64,
    pub net_cost_with_penalties_eur: f64,
    /// Cost of the same consumption bought entirely from the grid (€).
    pub grid_only_cost_eur: f64,
    /// Grid-only cost minus net cost (€).
    pub savings_eur: f64,
    /// Years to recover the system cost at the run's savings rate.
    pub payback_years: f64,
}

/// `num / den`, or 0 when the denominator is not positive.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 && num.is_finite() { num / den } else { 0.0 }
}

/// Years needed to recover `system_cost_eur` from `savings_eur` earned over
/// `hours` of operation. 0 without savings or without a cost.
pub fn payback_years(system_cost_eur: f64, savings_eur: f64, hours: f64) -> f64 {
    let annual = savings_eur * ratio(HOURS_PER_YEAR, hours);
    if system_cost_eur > 0.0 && annual > 0.0 {
        system_cost_eur / annual
    } else {
        0.0
    }
}

/// Index of the record holding the temperature reached at `deadline_hour`.
///
/// That is the first step ending at or after the deadline, so a deadline
/// falling inside a step is judged at the end of that step. Runs too short
/// to reach it, and deadlines at midnight, use the last record.
pub fn deadline_index(len: usize, dt_hours: f64, deadline_hour: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let k = if dt_hours > 0.0 {
        (deadline_hour / dt_hours).ceil() as usize
    } else {
        0
    };
    if k == 0 || k > len {
        Some(len - 1)
    } else {
        Some(k - 1)
    }
}

/// Equivalent full cycles from the battery states before and after each step.
pub fn battery_cycles(records: &[StepRecord], initial_states: &[(String, DeviceState)]) -> f64 {
    let mut throughput_kwh = 0.0;
    let mut capacity_kwh = 0.0;
    for (id, state) in initial_states {
        let DeviceState::Battery {
            capacity_kwh: capacity,
            ..
        } = *state
        else {
            continue;
        };
        capacity_kwh += capacity;
        let mut previous = state.stored_kwh().unwrap_or(0.0);
        for stored in records
            .iter()
            .filter_map(|r| r.device_state(id)?.stored_kwh())
        {
            throughput_kwh += (stored - previous).abs();
            previous = stored;
        }
    }
    ratio(throughput_kwh, 2.0 * capacity_kwh)
}

/// Comfort figures `(uptime, hit_rate, deficit_k)` of the tanks.
///
/// A sample is at target only when it reaches the comfort target; any
/// shortfall at the deadline counts in full toward the deficit.
pub fn ecs_comfort(
    records: &[StepRecord],
    initial_states: &[(String, DeviceState)],
    contract: &EcsServiceContract,
    dt_hours: f64,
) -> (f64, f64, f64) {
    let deadline = deadline_index(records.len(), dt_hours, contract.deadline_hour);
    let mut samples = 0usize;
    let mut comfortable = 0usize;
    let mut tanks = 0usize;
    let mut hits = 0usize;
    let mut deficit_k = 0.0;

    for (id, state) in initial_states {
        let DeviceState::ThermalTank { target_c, .. } = *state else {
            continue;
        };
        let comfort_c = contract.effective_target_c(target_c);
        tanks += 1;

        for r in records {
            if let Some(t) = r.device_state(id).and_then(|s| s.temperature_c()) {
                samples += 1;
                if comfort_c - t <= TEMPERATURE_EPSILON_K {
                    comfortable += 1;
                }
            }
        }

        let at_deadline = deadline
            .and_then(|i| records[i].device_state(id))
            .and_then(|s| s.temperature_c());
        if let Some(t) = at_deadline {
            let shortfall = comfort_c - t;
            if shortfall > TEMPERATURE_EPSILON_K {
                deficit_k += shortfall;
            } else {
                hits += 1;
            }
        }
    }

    (
        ratio(comfortable as f64, samples as f64),
        ratio(hits as f64, tanks as f64),
        deficit_k,
    )
}

impl KpiReport {
    /// Computes all KPIs of one run.
    ///
    /// # Arguments
    ///
    /// * `records` - Step records after end-of-run patching
    /// * `totals` - Totals of those records
    /// * `initial_states` - Device states before the first step
    /// * `contract` - Comfort contract of the run
    /// * `dt_hours` - Step duration
    /// * `system_cost_eur` - Installed cost for the payback estimate
    pub fn from_run(
        records: &[StepRecord],
        totals: &Totals,
        initial_states: &[(String, DeviceState)],
        contract: &EcsServiceContract,
        dt_hours: f64,
        system_cost_eur: f64,
    ) -> Self {
        let (ecs_uptime, ecs_hit_rate, measured_deficit_k) =
            ecs_comfort(records, initial_states, contract, dt_hours);
        let ecs_deficit_k = match contract.mode {
            EcsMode::Force => 0.0,
            EcsMode::Penalize | EcsMode::Off => measured_deficit_k,
        };
        let ecs_penalty_eur = match contract.mode {
            EcsMode::Penalize => ecs_deficit_k * contract.penalty_per_kelvin,
            EcsMode::Force | EcsMode::Off => 0.0,
        };

        Self::from_totals(
            totals,
            battery_cycles(records, initial_states),
            ecs_uptime,
            ecs_hit_rate,
            ecs_deficit_k,
            ecs_penalty_eur,
            records.len() as f64 * dt_hours,
            system_cost_eur,
        )
    }

    /// Assembles a report from totals and already aggregated comfort figures.
    #[expect(clippy::too_many_arguments)]
    pub fn from_totals(
        totals: &Totals,
        battery_cycles: f64,
        ecs_uptime: f64,
        ecs_hit_rate: f64,
        ecs_deficit_k: f64,
        ecs_penalty_eur: f64,
        hours: f64,
        system_cost_eur: f64,
    ) -> Self {
        let net_cost_eur = totals.net_cost_eur();
        let savings_eur = totals.grid_only_cost_eur - net_cost_eur;
        Self {
            self_consumption: ratio(totals.pv_used_on_site_kwh, totals.consumption_kwh),
            self_production: ratio(totals.pv_used_on_site_kwh, totals.pv_kwh),
            battery_cycles,
            ecs_uptime,
            ecs_hit_rate,
            ecs_deficit_k,
            ecs_penalty_eur,
            ecs_rescue_kwh: totals.ecs_rescue_kwh,
            import_cost_eur: totals.import_cost_eur,
            export_revenue_eur: totals.export_revenue_eur,
            net_cost_eur,
            net_cost_with_penalties_eur: net_cost_eur + ecs_penalty_eur,
            grid_only_cost_eur: totals.grid_only_cost_eur,
            savings_eur,
            payback_years: payback_years(system_cost_eur, savings_eur, hours),
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Self-consumption:      {:.1}%", self.self_consumption * 100.0)?;
        writeln!(f, "Self-production:       {:.1}%", self.self_production * 100.0)?;
        writeln!(f, "Battery cycles:        {:.3}", self.battery_cycles)?;
        writeln!(
            f,
            "ECS uptime / hit rate: {:.1}% / {:.0}%",
            self.ecs_uptime * 100.0,
            self.ecs_hit_rate * 100.0
        )?;
        writeln!(
            f,
            "ECS deficit:           {:.2} K (penalty {:.2} EUR, rescue {:.2} kWh)",
            self.ecs_deficit_k, self.ecs_penalty_eur, self.ecs_rescue_kwh
        )?;
        writeln!(
            f,
            "Import / export:       {:.2} EUR / {:.2} EUR",
            self.import_cost_eur, self.export_revenue_eur
        )?;
        writeln!(
            f,
            "Net cost:              {:.2} EUR ({:.2} EUR with penalties)",
            self.net_cost_eur, self.net_cost_with_penalties_eur
        )?;
        writeln!(
            f,
            "Grid-only cost:        {:.2} EUR (savings {:.2} EUR)",
            self.grid_only_cost_eur, self.savings_eur
        )?;
        write!(f, "Payback:               {:.1} years", self.payback_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::flows::FlowRecord;
    use crate::sim::types::DeviceStep;

    fn record(step: usize, state: DeviceState) -> StepRecord {
        StepRecord {
            step,
            time_h: step as f64,
            pv_kw: 0.0,
            base_load_kw: 0.0,
            ecs_kw: 0.0,
            battery_kw: 0.0,
            pv_used_on_site_kw: 0.0,
            grid_import_kw: 0.0,
            grid_export_kw: 0.0,
            import_price: 0.25,
            export_price: 0.1,
            flows: FlowRecord::default(),
            devices: vec![DeviceStep {
                device_id: "dev".into(),
                power_kw: 0.0,
                state,
            }],
            rescue_kwh: 0.0,
        }
    }

    fn battery(soc: f64) -> DeviceState {
        DeviceState::Battery {
            soc,
            capacity_kwh: 10.0,
        }
    }

    fn tank(temperature_c: f64) -> DeviceState {
        DeviceState::ThermalTank {
            temperature_c,
            target_c: 55.0,
        }
    }

    #[test]
    fn ratios_never_nan() {
        assert_eq!(ratio(1.0, 0.0), 0.0);
        assert_eq!(ratio(0.0, 0.0), 0.0);
        assert_eq!(ratio(f64::NAN, 1.0), 0.0);
        assert_eq!(ratio(1.0, 4.0), 0.25);
    }

    #[test]
    fn empty_run_is_all_zero() {
        let kpi = KpiReport::from_run(
            &[],
            &Totals::default(),
            &[],
            &EcsServiceContract::default(),
            0.25,
            5000.0,
        );
        assert_eq!(kpi, KpiReport::default());
    }

    #[test]
    fn cycles_from_soc_deltas() {
        let records: Vec<StepRecord> = [0.7, 0.9, 0.5]
            .iter()
            .enumerate()
            .map(|(i, &soc)| record(i, battery(soc)))
            .collect();
        let initial = vec![("dev".to_string(), battery(0.5))];
        // |2| + |2| + |4| kWh over 2 x 10 kWh.
        let cycles = battery_cycles(&records, &initial);
        assert!((cycles - 0.4).abs() < 1e-12);
    }

    #[test]
    fn deadline_index_cases() {
        assert_eq!(deadline_index(96, 0.25, 21.0), Some(83));
        assert_eq!(deadline_index(24, 1.0, 21.5), Some(21));
        assert_eq!(deadline_index(24, 1.0, 0.0), Some(23));
        assert_eq!(deadline_index(10, 1.0, 21.0), Some(9));
        assert_eq!(deadline_index(0, 1.0, 21.0), None);
    }

    #[test]
    fn comfort_uses_deadline_sample() {
        let mut records: Vec<StepRecord> = (0..24).map(|i| record(i, tank(50.0))).collect();
        records[20] = record(20, tank(55.0));
        let initial = vec![("dev".to_string(), tank(45.0))];
        let contract = EcsServiceContract::default();

        let (uptime, hit_rate, deficit) = ecs_comfort(&records, &initial, &contract, 1.0);
        assert!((uptime - 1.0 / 24.0).abs() < 1e-12);
        assert_eq!(hit_rate, 1.0);
        assert_eq!(deficit, 0.0);

        records[20] = record(20, tank(52.0));
        let (_, hit_rate, deficit) = ecs_comfort(&records, &initial, &contract, 1.0);
        assert_eq!(hit_rate, 0.0);
        assert_eq!(deficit, 3.0);
    }

    #[test]
    fn small_shortfall_counts_in_full() {
        let records: Vec<StepRecord> = (0..24).map(|i| record(i, tank(54.6))).collect();
        let initial = vec![("dev".to_string(), tank(54.6))];
        let contract = EcsServiceContract::default();

        let (uptime, hit_rate, deficit) = ecs_comfort(&records, &initial, &contract, 1.0);
        assert_eq!(uptime, 0.0);
        assert_eq!(hit_rate, 0.0);
        assert!((deficit - 0.4).abs() < 1e-9);
    }

    #[test]
    fn comfort_judged_against_contract_target() {
        let records: Vec<StepRecord> = (0..24).map(|i| record(i, tank(52.0))).collect();
        let initial = vec![("dev".to_string(), tank(52.0))];
        let contract = EcsServiceContract {
            target_c: 50.0,
            ..Default::default()
        };
        assert_eq!(ecs_comfort(&records, &initial, &contract, 1.0), (1.0, 1.0, 0.0));
    }

    #[test]
    fn mode_controls_deficit_and_penalty() {
        let records: Vec<StepRecord> = (0..24).map(|i| record(i, tank(50.0))).collect();
        let initial = vec![("dev".to_string(), tank(50.0))];
        let totals = Totals::from_records(&records, 1.0);

        let kpi_for = |mode| {
            let contract = EcsServiceContract {
                mode,
                ..Default::default()
            };
            KpiReport::from_run(&records, &totals, &initial, &contract, 1.0, 0.0)
        };

        let force = kpi_for(EcsMode::Force);
        assert_eq!(force.ecs_deficit_k, 0.0);
        assert_eq!(force.ecs_penalty_eur, 0.0);

        let penalize = kpi_for(EcsMode::Penalize);
        assert_eq!(penalize.ecs_deficit_k, 5.0);
        assert!((penalize.ecs_penalty_eur - 5.0 * 0.08).abs() < 1e-12);
        assert!((penalize.net_cost_with_penalties_eur - penalize.net_cost_eur - 0.4).abs() < 1e-12);

        let off = kpi_for(EcsMode::Off);
        assert_eq!(off.ecs_deficit_k, 5.0);
        assert_eq!(off.ecs_penalty_eur, 0.0);
    }

    #[test]
    fn payback_annualizes_savings() {
        // 1 EUR saved per day.
        assert!((payback_years(365.0, 1.0, 24.0) - 1.0).abs() < 1e-12);
        assert_eq!(payback_years(365.0, -1.0, 24.0), 0.0);
        assert_eq!(payback_years(0.0, 1.0, 24.0), 0.0);
    }

    #[test]
    fn display_does_not_panic() {
        let s = format!("{}", KpiReport::default());
        assert!(s.contains("KPI Report"));
    }
}
