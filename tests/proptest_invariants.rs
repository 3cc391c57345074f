//! Property-based tests for the allocation primitive and the engine.
//!
//! Random demands, orders and daily profiles, checked against the
//! invariants every run must hold.

mod common;

use home_energy_sim::devices::{Battery, Device, ThermalTank};
use home_energy_sim::sim::allocation::{PowerDemand, allocate};
use home_energy_sim::sim::ecs::{EcsMode, EcsServiceContract};
use home_energy_sim::sim::engine::simulate;
use home_energy_sim::sim::strategy::PriorityPolicy;
use home_energy_sim::sim::types::SimulationInput;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

const IDS: [&str; 4] = ["battery", "ecs", "pool", "ev"];

fn arb_demands() -> impl Strategy<Value = Vec<PowerDemand>> {
    proptest::collection::vec((0..IDS.len(), -2.0..8.0f64), 0..6).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(i, kw)| PowerDemand::new(IDS[i], kw))
            .collect()
    })
}

fn arb_order() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::collection::vec(0..IDS.len(), 0..6)
        .prop_map(|idx| idx.into_iter().map(|i| IDS[i]).collect())
}

fn arb_policy() -> impl Strategy<Value = PriorityPolicy> {
    prop_oneof![
        Just(PriorityPolicy::EcsFirst),
        Just(PriorityPolicy::BatteryFirst),
        (0.0..100.0f64).prop_map(|threshold_pct| PriorityPolicy::MixSoc { threshold_pct }),
    ]
}

fn arb_mode() -> impl Strategy<Value = EcsMode> {
    prop_oneof![
        Just(EcsMode::Force),
        Just(EcsMode::Penalize),
        Just(EcsMode::Off)
    ]
}

/// A day of 48 half-hour steps with random PV, load and prices.
fn arb_input() -> impl Strategy<Value = SimulationInput> {
    (
        proptest::collection::vec(0.0..7.0f64, 48),
        proptest::collection::vec(0.0..3.0f64, 48),
        proptest::collection::vec(0.05..0.6f64, 1..48),
        arb_mode(),
        any::<bool>(),
    )
        .prop_map(|(pv, load, prices, mode, hysteresis_enabled)| {
            SimulationInput::new(1800.0, pv, load)
                .with_prices(prices, vec![0.08])
                .with_contract(EcsServiceContract {
                    mode,
                    hysteresis_enabled,
                    ..EcsServiceContract::default()
                })
        })
}

fn arb_devices() -> impl Strategy<Value = Vec<Device>> {
    (1.0..20.0f64, 0.1..0.9f64, 0.5..6.0f64, 30.0..55.0f64).prop_map(
        |(capacity, soc, power, temp)| {
            vec![
                Battery::new("battery", capacity, soc, 0.1, 0.9, 0.95, 0.95, power).into(),
                ThermalTank::new("ecs", 150.0, 2.0, 0.95, 2.0, 55.0, temp).into(),
            ]
        },
    )
}

// ===========================================================================
// Allocation
// ===========================================================================

proptest! {
    #[test]
    fn allocation_never_exceeds_available_or_demand(
        available in 0.0..10.0f64,
        demands in arb_demands(),
        order in arb_order(),
    ) {
        let out = allocate(available, &demands, &order).unwrap();

        let total: f64 = out.iter().map(|a| a.kw).sum();
        prop_assert!(total <= available + 1e-9);

        for a in &out {
            prop_assert!(a.kw >= 0.0);
            prop_assert!(order.contains(&a.device_id.as_str()));
            let demand = demands
                .iter()
                .find(|d| d.device_id == a.device_id)
                .map_or(0.0, |d| d.kw.max(0.0));
            prop_assert!(a.kw <= demand);
        }

        // One entry per distinct ordered id.
        let mut ids: Vec<&str> = out.iter().map(|a| a.device_id.as_str()).collect();
        let reported = ids.len();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), reported);
    }

    #[test]
    fn allocation_serves_earlier_ids_fully_first(
        available in 0.0..10.0f64,
        demands in arb_demands(),
        order in arb_order(),
    ) {
        let out = allocate(available, &demands, &order).unwrap();
        let mut starved = false;
        for a in &out {
            let demand = demands
                .iter()
                .find(|d| d.device_id == a.device_id)
                .map_or(0.0, |d| d.kw.max(0.0));
            if starved {
                prop_assert_eq!(a.kw, 0.0);
            }
            if a.kw < demand {
                starved = true;
            }
        }
    }

    #[test]
    fn negative_available_is_rejected(available in -10.0..-1e-6f64, demands in arb_demands()) {
        prop_assert!(allocate(available, &demands, &["ecs"]).is_err());
    }
}

// ===========================================================================
// Engine
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn engine_conserves_energy_and_respects_bounds(
        input in arb_input(),
        devices in arb_devices(),
        policy in arb_policy(),
    ) {
        let mut devices = devices;
        let result = simulate(&input, &mut devices, &policy).unwrap();
        prop_assert_eq!(result.records.len(), 48);
        common::assert_conserved(&result);

        for soc in result.soc_series("battery") {
            prop_assert!((10.0 - 1e-9..=90.0 + 1e-9).contains(&soc));
        }
        for temp in result.temperature_series("ecs") {
            prop_assert!(temp <= 55.0 + 1e-9);
        }
        for r in &result.records {
            prop_assert!(r.grid_import_kw >= 0.0 && r.grid_export_kw >= 0.0);
            // A rescued last step may import the spike while exporting PV.
            if r.rescue_kwh == 0.0 {
                prop_assert!(r.grid_import_kw == 0.0 || r.grid_export_kw == 0.0);
            }
        }

        let k = &result.kpis;
        for v in [k.self_consumption, k.self_production, k.ecs_uptime, k.ecs_hit_rate] {
            prop_assert!(v.is_finite() && (0.0..=1.0 + 1e-9).contains(&v));
        }
        if input.contract.mode != EcsMode::Penalize {
            prop_assert_eq!(k.ecs_penalty_eur, 0.0);
        }
    }
}
