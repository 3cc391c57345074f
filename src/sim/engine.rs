//! Simulation engine that orchestrates devices, helpers, strategy and flows.

use tracing::{debug, trace, warn};

use crate::devices::{Capability, Device, DeviceModel, DeviceState, Environment, PowerOffer};
use crate::error::SimError;

use super::clock::Clock;
use super::ecs::{EcsHelper, EcsMode, EcsServiceContract};
use super::flows::{NetPowers, reconstruct};
use super::kpi::KpiReport;
use super::strategy::{Strategy, StrategyContext, StrategyRequest};
use super::types::{DeviceStep, SimConfig, SimulationInput, SimulationResult, StepRecord, Totals};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Finalizing,
    Done,
}

/// Runs one simulation over borrowed devices.
///
/// The engine mutates the devices in place, so a caller reusing the same
/// slice for a later run continues from the states this run ends in.
pub struct Engine<'a, S: Strategy + ?Sized> {
    config: SimConfig,
    input: &'a SimulationInput,
    devices: &'a mut [Device],
    strategy: &'a S,
    contract: EcsServiceContract,
    helper: EcsHelper,
    clock: Clock,
    phase: Phase,
    initial_states: Vec<(String, DeviceState)>,
    records: Vec<StepRecord>,
}

impl<'a, S: Strategy + ?Sized> Engine<'a, S> {
    /// Creates an engine for one run.
    ///
    /// The strategy may replace the input's comfort contract with a derived
    /// variant; the input itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the step size is invalid or the PV and base-load
    /// series differ in length.
    pub fn new(
        input: &'a SimulationInput,
        devices: &'a mut [Device],
        strategy: &'a S,
    ) -> Result<Self, SimError> {
        let config = SimConfig::new(input.step_seconds)?;
        let steps = input.steps()?;
        let contract = strategy
            .derive_contract(&input.contract)
            .unwrap_or_else(|| input.contract.clone());
        let initial_states = devices
            .iter()
            .map(|d| (d.id().to_string(), d.state()))
            .collect();

        Ok(Self {
            config,
            input,
            devices,
            strategy,
            contract,
            helper: EcsHelper::new(),
            clock: Clock::new(steps, config.dt_hours),
            phase: Phase::Idle,
            initial_states,
            records: Vec::with_capacity(steps),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Executes the next timestep and returns its record, or `None` once
    /// every step has run.
    pub fn step(&mut self) -> Option<&StepRecord> {
        let t = self.clock.tick()?;
        self.phase = Phase::Running;
        let record = self.run_step(t);
        trace!(step = t, "{record}");
        self.records.push(record);
        self.records.last()
    }

    fn environment(&self, t: usize) -> Environment {
        Environment {
            step: t,
            time_h: self.clock.time_of_day(t),
            dt_hours: self.config.dt_hours,
            pv_kw: self.input.pv_kw[t].max(0.0),
            base_load_kw: self.input.base_load_kw[t].max(0.0),
            ambient_c: self.input.ambient_at(t),
            import_price: self.input.import_price_at(t),
            export_price: self.input.export_price_at(t),
        }
    }

    fn index_of(&self, device_id: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.id() == device_id)
    }

    fn run_step(&mut self, t: usize) -> StepRecord {
        let env = self.environment(t);

        // 1. Collect plans
        let plans: Vec<_> = self.devices.iter().map(|d| d.plan(&env)).collect();
        let requests = plans.iter().filter_map(|p| p.request.clone()).collect();
        let mut offers: Vec<PowerOffer> = plans.into_iter().filter_map(|p| p.offer).collect();

        let surplus_kw = (env.pv_kw - env.base_load_kw).max(0.0);
        let mut deficit_kw = (env.base_load_kw - env.pv_kw).max(0.0);

        // 2. ECS helpers shape tank requests and force deadline heating
        let outcome =
            self.helper
                .process(requests, &*self.devices, &env, surplus_kw, &self.contract);

        let mut granted_kw = vec![0.0; self.devices.len()];
        for forced in &outcome.forced {
            if let Some(i) = self.index_of(&forced.device_id) {
                granted_kw[i] += forced.kw;
            }
        }

        // 3. Strategy shares the residual surplus
        let ctx = StrategyContext {
            step: t,
            time_h: env.time_h,
            dt_hours: env.dt_hours,
            surplus_kw: outcome.surplus_kw,
            pv_kw: env.pv_kw,
            base_load_kw: env.base_load_kw,
            import_price: env.import_price,
            export_price: env.export_price,
            ambient_c: env.ambient_c,
            requests: outcome
                .requests
                .iter()
                .filter_map(|r| {
                    let device = &self.devices[self.index_of(&r.device_id)?];
                    Some(StrategyRequest {
                        device_id: r.device_id.clone(),
                        capabilities: device.capabilities(),
                        max_accept_kw: r.max_accept_kw,
                        priority_hint: r.priority_hint,
                        deadline_priority: r.deadline_priority(),
                        state: device.state(),
                    })
                })
                .collect(),
        };

        let mut remaining_kw = outcome.surplus_kw;
        let mut strategy_kw = vec![0.0; self.devices.len()];
        for allocation in self.strategy.allocate(&ctx) {
            let request = outcome
                .requests
                .iter()
                .find(|r| r.device_id == allocation.device_id);
            let (Some(request), Some(i)) = (request, self.index_of(&allocation.device_id)) else {
                if allocation.kw > 0.0 {
                    warn!(device = %allocation.device_id, step = t, "allocation to a device without request ignored");
                }
                continue;
            };
            if !(allocation.kw >= 0.0) {
                warn!(device = %allocation.device_id, kw = allocation.kw, step = t, "invalid allocation clamped to zero");
                continue;
            }
            let headroom_kw = (request.max_accept_kw - strategy_kw[i]).max(0.0);
            let kw = allocation.kw.min(headroom_kw).min(remaining_kw).max(0.0);
            strategy_kw[i] += kw;
            granted_kw[i] += kw;
            remaining_kw = (remaining_kw - kw).max(0.0);
        }

        // 4. Offers cover the deficit, cheapest first
        offers.sort_by(|a, b| {
            a.cost_penalty
                .total_cmp(&b.cost_penalty)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        for offer in &offers {
            if deficit_kw <= 0.0 {
                break;
            }
            let Some(i) = self.index_of(&offer.device_id) else {
                continue;
            };
            let kw = offer.max_supply_kw.max(0.0).min(deficit_kw);
            granted_kw[i] -= kw;
            deficit_kw -= kw;
        }

        // 5. Apply to every device exactly once
        let mut ecs_kw = 0.0;
        let mut battery_kw = 0.0;
        let mut device_steps = Vec::with_capacity(self.devices.len());
        for (device, &power_kw) in self.devices.iter_mut().zip(&granted_kw) {
            let actual_kw = device.apply(power_kw, &env);
            if device.has(Capability::ThermalStorage) {
                ecs_kw += actual_kw;
            } else if device.has(Capability::ElectricalStorage) {
                battery_kw += actual_kw;
            }
            device_steps.push(DeviceStep {
                device_id: device.id().to_string(),
                power_kw: actual_kw,
                state: device.state(),
            });
        }

        // 6. Flows from net powers
        let powers = NetPowers {
            pv_kw: env.pv_kw,
            base_load_kw: env.base_load_kw,
            ecs_kw,
            battery_kw,
        };
        let flows = reconstruct(&powers, env.dt_hours);

        StepRecord {
            step: t,
            time_h: env.time_h,
            pv_kw: env.pv_kw,
            base_load_kw: env.base_load_kw,
            ecs_kw,
            battery_kw,
            pv_used_on_site_kw: flows.pv_used_on_site() / env.dt_hours,
            grid_import_kw: powers.grid_import_kw(),
            grid_export_kw: powers.grid_export_kw(),
            import_price: env.import_price,
            export_price: env.export_price,
            flows,
            devices: device_steps,
            rescue_kwh: 0.0,
        }
    }

    /// Tops up every tank left below its comfort target by billing a
    /// grid-import spike to the last step. Only in force mode.
    fn rescue(&mut self) {
        if self.contract.mode != EcsMode::Force {
            return;
        }
        let dt = self.config.dt_hours;
        let Some(last) = self.records.last_mut() else {
            return;
        };

        for tank in self.devices.iter_mut().filter_map(Device::as_thermal_tank_mut) {
            let comfort_c = self.contract.effective_target_c(tank.target_c);
            if !tank.below(comfort_c) {
                continue;
            }
            let energy_kwh = tank.enforce_temperature(comfort_c);
            debug!(device = %tank.id, energy_kwh, comfort_c, step = last.step, "end-of-run rescue");

            let spike_kw = energy_kwh / dt;
            last.ecs_kw += spike_kw;
            last.grid_import_kw += spike_kw;
            last.flows.grid_to_ecs += energy_kwh;
            last.rescue_kwh += energy_kwh;
            if let Some(entry) = last.devices.iter_mut().find(|d| d.device_id == tank.id) {
                entry.power_kw += spike_kw;
                entry.state = tank.state();
            }
        }
    }

    /// Runs every remaining step, finalizes, and compiles the result.
    pub fn run(mut self) -> SimulationResult {
        debug!(
            strategy = self.strategy.name(),
            steps = self.input.pv_kw.len(),
            devices = self.devices.len(),
            mode = self.contract.mode.as_str(),
            "simulation started"
        );
        while self.step().is_some() {}

        self.phase = Phase::Finalizing;
        self.rescue();

        let dt = self.config.dt_hours;
        let totals = Totals::from_records(&self.records, dt);
        let kpis = KpiReport::from_run(
            &self.records,
            &totals,
            &self.initial_states,
            &self.contract,
            dt,
            self.input.system_cost_eur,
        );
        self.phase = Phase::Done;
        debug!(
            net_cost_eur = kpis.net_cost_eur,
            self_consumption = kpis.self_consumption,
            "simulation finished"
        );

        SimulationResult {
            strategy: self.strategy.name().to_string(),
            dt_hours: dt,
            contract: self.contract,
            records: self.records,
            initial_states: self.initial_states,
            totals,
            kpis,
        }
    }
}

/// Runs one simulation of `input` over `devices` with `strategy`.
///
/// # Errors
///
/// Returns an error if the step size is invalid or the PV and base-load
/// series differ in length.
pub fn simulate<S: Strategy + ?Sized>(
    input: &SimulationInput,
    devices: &mut [Device],
    strategy: &S,
) -> Result<SimulationResult, SimError> {
    Ok(Engine::new(input, devices, strategy)?.run())
}
