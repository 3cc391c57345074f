//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use home_energy_sim::devices::{Battery, Device, ThermalTank};
use home_energy_sim::sim::ecs::EcsServiceContract;
use home_energy_sim::sim::types::{SimulationInput, SimulationResult};

/// Quarter-hour steps.
pub const STEP_SECONDS: f64 = 900.0;
pub const STEPS_PER_DAY: usize = 96;

/// Bell-shaped PV between 6h and 20h peaking at `peak_kw` (96 steps).
pub fn sunny_pv(peak_kw: f64) -> Vec<f64> {
    (0..STEPS_PER_DAY)
        .map(|k| {
            let t = k as f64 * 0.25;
            let x = (t - 6.0) / 14.0;
            if (0.0..=1.0).contains(&x) {
                peak_kw * (std::f64::consts::PI * x).sin()
            } else {
                0.0
            }
        })
        .collect()
}

/// Household load with an evening peak (96 steps).
pub fn evening_load() -> Vec<f64> {
    (0..STEPS_PER_DAY)
        .map(|k| match k / 4 {
            7 | 8 => 0.9,
            18..=21 => 1.6,
            _ => 0.4,
        })
        .collect()
}

/// One sunny day with a peak/off-peak tariff.
pub fn sunny_day() -> SimulationInput {
    let import: Vec<f64> = (0..STEPS_PER_DAY)
        .map(|k| if (24..88).contains(&k) { 0.28 } else { 0.18 })
        .collect();
    SimulationInput::new(STEP_SECONDS, sunny_pv(5.0), evening_load())
        .with_ambient(vec![18.0; STEPS_PER_DAY])
        .with_prices(import, vec![0.10])
        .with_system_cost(9000.0)
}

/// Constant PV and load over one day.
pub fn flat_day(pv_kw: f64, base_load_kw: f64) -> SimulationInput {
    SimulationInput::new(
        STEP_SECONDS,
        vec![pv_kw; STEPS_PER_DAY],
        vec![base_load_kw; STEPS_PER_DAY],
    )
}

/// Default battery (10 kWh, 50% SOC, 3 kW, 95% efficiency).
pub fn default_battery() -> Battery {
    Battery::new("battery", 10.0, 0.5, 0.1, 0.95, 0.95, 0.95, 3.0)
}

/// Default tank (200 L, 2 kW element, 55 °C target, starting at 45 °C).
pub fn default_tank() -> ThermalTank {
    ThermalTank::new("ecs", 200.0, 2.0, 0.95, 2.0, 55.0, 45.0)
}

pub fn default_devices() -> Vec<Device> {
    vec![default_battery().into(), default_tank().into()]
}

pub fn contract_with(f: impl FnOnce(&mut EcsServiceContract)) -> EcsServiceContract {
    let mut contract = EcsServiceContract::default();
    f(&mut contract);
    contract
}

/// Asserts power balance on every step and energy balance on the totals.
pub fn assert_conserved(result: &SimulationResult) {
    for r in &result.records {
        let supply = r.pv_kw + r.grid_import_kw;
        let demand = r.base_load_kw + r.ecs_kw + r.battery_kw + r.grid_export_kw;
        let scale = supply.abs().max(demand.abs()).max(1.0);
        assert!(
            (supply - demand).abs() <= 1e-6 * scale,
            "step {} unbalanced: supply={supply} demand={demand}",
            r.step
        );
    }

    let t = &result.totals;
    let supply = t.pv_kwh + t.grid_import_kwh;
    let demand = t.consumption_kwh + t.battery_delta_kwh + t.grid_export_kwh;
    let scale = supply.abs().max(demand.abs()).max(1.0);
    assert!(
        (supply - demand).abs() <= 1e-6 * scale,
        "totals unbalanced: supply={supply} demand={demand}"
    );
}
