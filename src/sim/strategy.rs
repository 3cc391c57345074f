//! Strategies deciding how surplus power is shared between devices.
//!
//! Every provided strategy sorts the pending requests into a priority order
//! and hands it to [`allocate`]. They differ only in the tier each device
//! lands in.

use std::cmp::Reverse;

use enumset::EnumSet;
use tracing::warn;

use crate::devices::{Capability, DeviceState};
use crate::forecast::{ForecastWindow, TempoColor};

use super::allocation::{Allocation, PowerDemand, allocate};
use super::ecs::EcsServiceContract;

/// Identifiers of the built-in priority policies.
pub const STRATEGY_IDS: [&str; 3] = ["ecs_first", "battery_first", "mix_soc"];

/// Default SOC threshold of the mixed policy (%).
pub const DEFAULT_SOC_THRESHOLD_PCT: f64 = 50.0;

/// A pending request as seen by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRequest {
    pub device_id: String,
    pub capabilities: EnumSet<Capability>,
    pub max_accept_kw: f64,
    pub priority_hint: Option<i32>,
    /// 0 when the deadline helper marked the request urgent, 1 otherwise.
    pub deadline_priority: u8,
    pub state: DeviceState,
}

/// Everything a strategy may look at for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyContext {
    pub step: usize,
    pub time_h: f64,
    pub dt_hours: f64,
    /// Surplus left after forced grants (kW).
    pub surplus_kw: f64,
    pub pv_kw: f64,
    pub base_load_kw: f64,
    pub import_price: f64,
    pub export_price: f64,
    pub ambient_c: f64,
    pub requests: Vec<StrategyRequest>,
}

impl StrategyContext {
    /// Mean SOC (%) of the batteries asking for power, `None` if none is.
    pub fn mean_storage_soc_pct(&self) -> Option<f64> {
        let socs: Vec<f64> = self
            .requests
            .iter()
            .filter(|r| r.capabilities.contains(Capability::ElectricalStorage))
            .filter_map(|r| r.state.soc_pct())
            .collect();
        if socs.is_empty() {
            None
        } else {
            Some(socs.iter().sum::<f64>() / socs.len() as f64)
        }
    }
}

/// Trait for per-step allocation policies.
///
/// Closures `Fn(&StrategyContext) -> Vec<Allocation>` are strategies too.
pub trait Strategy {
    /// Distributes `ctx.surplus_kw` over `ctx.requests`.
    fn allocate(&self, ctx: &StrategyContext) -> Vec<Allocation>;

    /// Short name used in reports.
    fn name(&self) -> &str {
        "custom"
    }

    /// Contract variant this strategy wants to run under, derived from the
    /// shared base without modifying it.
    fn derive_contract(&self, _base: &EcsServiceContract) -> Option<EcsServiceContract> {
        None
    }
}

impl<F> Strategy for F
where
    F: Fn(&StrategyContext) -> Vec<Allocation>,
{
    fn allocate(&self, ctx: &StrategyContext) -> Vec<Allocation> {
        self(ctx)
    }
}

/// Strategy that also consults a rolling forecast window.
pub trait ForecastStrategy {
    fn allocate(&self, ctx: &StrategyContext, window: &ForecastWindow) -> Vec<Allocation>;

    fn name(&self) -> &str {
        "forecast"
    }

    fn derive_contract(&self, _base: &EcsServiceContract) -> Option<EcsServiceContract> {
        None
    }
}

/// Runs a plain strategy where a forecast-aware one is expected.
#[derive(Debug, Clone)]
pub struct Reactive<S>(pub S);

impl<S: Strategy> ForecastStrategy for Reactive<S> {
    fn allocate(&self, ctx: &StrategyContext, _window: &ForecastWindow) -> Vec<Allocation> {
        self.0.allocate(ctx)
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn derive_contract(&self, base: &EcsServiceContract) -> Option<EcsServiceContract> {
        self.0.derive_contract(base)
    }
}

/// Built-in priority policies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum PriorityPolicy {
    /// Tanks before batteries.
    #[default]
    EcsFirst,
    /// Batteries before tanks.
    BatteryFirst,
    /// Batteries first while their mean SOC is below the threshold.
    MixSoc { threshold_pct: f64 },
}

impl PriorityPolicy {
    /// Looks up a policy by identifier. Unknown identifiers fall back to
    /// [`PriorityPolicy::EcsFirst`].
    pub fn from_id(id: &str, soc_threshold_pct: f64) -> Self {
        match id {
            "ecs_first" | "ecs-first" => PriorityPolicy::EcsFirst,
            "battery_first" | "battery-first" => PriorityPolicy::BatteryFirst,
            "mix_soc" | "mix-soc" => PriorityPolicy::MixSoc {
                threshold_pct: soc_threshold_pct,
            },
            other => {
                warn!(strategy = other, "unknown strategy id, using ecs_first");
                PriorityPolicy::EcsFirst
            }
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            PriorityPolicy::EcsFirst => "ecs_first",
            PriorityPolicy::BatteryFirst => "battery_first",
            PriorityPolicy::MixSoc { .. } => "mix_soc",
        }
    }

    fn battery_first(&self, ctx: &StrategyContext) -> bool {
        match *self {
            PriorityPolicy::EcsFirst => false,
            PriorityPolicy::BatteryFirst => true,
            PriorityPolicy::MixSoc { threshold_pct } => ctx
                .mean_storage_soc_pct()
                .is_some_and(|soc| soc < threshold_pct),
        }
    }

    fn tier(battery_first: bool, capabilities: EnumSet<Capability>) -> u8 {
        let thermal = capabilities.contains(Capability::ThermalStorage);
        let electrical = capabilities.contains(Capability::ElectricalStorage);
        match (battery_first, thermal, electrical) {
            (false, true, _) | (true, false, true) => 0,
            (false, false, true) | (true, true, _) => 1,
            _ => 2,
        }
    }

    /// Device ids sorted by deadline priority, tier, descending hint, then id.
    pub fn priority_order(&self, ctx: &StrategyContext) -> Vec<String> {
        let battery_first = self.battery_first(ctx);
        let mut ranked: Vec<&StrategyRequest> = ctx.requests.iter().collect();
        ranked.sort_by(|a, b| {
            let key = |r: &StrategyRequest| {
                (
                    r.deadline_priority,
                    Self::tier(battery_first, r.capabilities),
                    Reverse(r.priority_hint),
                )
            };
            key(a)
                .cmp(&key(b))
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        ranked.into_iter().map(|r| r.device_id.clone()).collect()
    }
}

impl Strategy for PriorityPolicy {
    fn allocate(&self, ctx: &StrategyContext) -> Vec<Allocation> {
        let order = self.priority_order(ctx);
        let demands: Vec<PowerDemand> = ctx
            .requests
            .iter()
            .map(|r| PowerDemand::new(r.device_id.clone(), r.max_accept_kw))
            .collect();
        allocate(ctx.surplus_kw.max(0.0), &demands, &order).unwrap_or_else(|err| {
            warn!(%err, surplus_kw = ctx.surplus_kw, step = ctx.step, "allocation skipped");
            Vec::new()
        })
    }

    fn name(&self) -> &str {
        self.id()
    }
}

/// Forecast-aware greedy policy.
///
/// Serves the battery first when the energy it stores now is worth more
/// later: on a red Tempo day, or when the coming hours bring little PV and a
/// markedly higher import price. Otherwise the tank goes first.
#[derive(Debug, Clone)]
pub struct LookaheadStrategy {
    /// PV energy over the lookahead beyond which storage refills anyway (kWh).
    pub pv_abundance_kwh: f64,
    /// Price rise over the lookahead that makes storing worthwhile (€/kWh).
    pub price_spread_eur: f64,
    /// Hours of the window taken into account.
    pub lookahead_hours: usize,
}

impl Default for LookaheadStrategy {
    fn default() -> Self {
        Self {
            pv_abundance_kwh: 8.0,
            price_spread_eur: 0.05,
            lookahead_hours: 12,
        }
    }
}

impl LookaheadStrategy {
    /// Policy chosen for the step, given the window starting at its hour.
    pub fn policy(&self, ctx: &StrategyContext, window: &ForecastWindow) -> PriorityPolicy {
        let horizon = &window.samples[..self.lookahead_hours.min(window.samples.len())];
        let Some(now) = horizon.first() else {
            return PriorityPolicy::EcsFirst;
        };

        if now.color == Some(TempoColor::Red) {
            return PriorityPolicy::BatteryFirst;
        }

        let pv_ahead_kwh = window.pv_energy_kwh(self.lookahead_hours);
        let peak_price = horizon
            .iter()
            .map(|s| s.import_price)
            .fold(ctx.import_price, f64::max);
        if pv_ahead_kwh < self.pv_abundance_kwh
            && peak_price - ctx.import_price > self.price_spread_eur
        {
            PriorityPolicy::BatteryFirst
        } else {
            PriorityPolicy::EcsFirst
        }
    }
}

impl ForecastStrategy for LookaheadStrategy {
    fn allocate(&self, ctx: &StrategyContext, window: &ForecastWindow) -> Vec<Allocation> {
        self.policy(ctx, window).allocate(ctx)
    }

    fn name(&self) -> &str {
        "lookahead"
    }

    /// Always plans with deadline preheat and at least two hours of window.
    fn derive_contract(&self, base: &EcsServiceContract) -> Option<EcsServiceContract> {
        Some(EcsServiceContract {
            deadline_enabled: true,
            preheat_window_h: base.preheat_window_h.max(2.0),
            ..base.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastSample;

    fn battery_request(soc: f64) -> StrategyRequest {
        StrategyRequest {
            device_id: "battery".into(),
            capabilities: Capability::ElectricalStorage.into(),
            max_accept_kw: 3.0,
            priority_hint: None,
            deadline_priority: 1,
            state: DeviceState::Battery {
                soc,
                capacity_kwh: 10.0,
            },
        }
    }

    fn tank_request(id: &str) -> StrategyRequest {
        StrategyRequest {
            device_id: id.into(),
            capabilities: Capability::ThermalStorage.into(),
            max_accept_kw: 3.0,
            priority_hint: None,
            deadline_priority: 1,
            state: DeviceState::ThermalTank {
                temperature_c: 45.0,
                target_c: 55.0,
            },
        }
    }

    fn ctx(surplus_kw: f64, requests: Vec<StrategyRequest>) -> StrategyContext {
        StrategyContext {
            step: 0,
            time_h: 12.0,
            dt_hours: 0.25,
            surplus_kw,
            pv_kw: surplus_kw,
            base_load_kw: 0.0,
            import_price: 0.2,
            export_price: 0.1,
            ambient_c: 20.0,
            requests,
        }
    }

    fn grant(allocations: &[Allocation], id: &str) -> f64 {
        allocations
            .iter()
            .find(|a| a.device_id == id)
            .map_or(0.0, |a| a.kw)
    }

    #[test]
    fn ecs_first_serves_tank() {
        let c = ctx(5.0, vec![battery_request(0.5), tank_request("ecs")]);
        let out = PriorityPolicy::EcsFirst.allocate(&c);
        assert_eq!(grant(&out, "ecs"), 3.0);
        assert_eq!(grant(&out, "battery"), 2.0);
    }

    #[test]
    fn non_finite_surplus_grants_nothing() {
        let c = ctx(f64::NAN, vec![battery_request(0.5), tank_request("ecs")]);
        let out = PriorityPolicy::EcsFirst.allocate(&c);
        assert!(out.iter().all(|a| a.kw == 0.0));
    }

    #[test]
    fn battery_first_serves_battery() {
        let c = ctx(5.0, vec![battery_request(0.5), tank_request("ecs")]);
        let out = PriorityPolicy::BatteryFirst.allocate(&c);
        assert_eq!(grant(&out, "battery"), 3.0);
        assert_eq!(grant(&out, "ecs"), 2.0);
    }

    #[test]
    fn urgent_request_beats_tier() {
        let mut tank = tank_request("ecs");
        tank.deadline_priority = 0;
        let c = ctx(4.0, vec![battery_request(0.5), tank]);
        let order = PriorityPolicy::BatteryFirst.priority_order(&c);
        assert_eq!(order, vec!["ecs", "battery"]);
    }

    #[test]
    fn hint_then_id_break_ties() {
        let mut hinted = tank_request("z_tank");
        hinted.priority_hint = Some(5);
        let c = ctx(4.0, vec![tank_request("b_tank"), hinted, tank_request("a_tank")]);
        let order = PriorityPolicy::EcsFirst.priority_order(&c);
        assert_eq!(order, vec!["z_tank", "a_tank", "b_tank"]);
    }

    #[test]
    fn mix_soc_flips_on_threshold() {
        let policy = PriorityPolicy::MixSoc {
            threshold_pct: 50.0,
        };
        let low = ctx(3.0, vec![tank_request("ecs"), battery_request(0.3)]);
        assert_eq!(policy.priority_order(&low), vec!["battery", "ecs"]);
        let high = ctx(3.0, vec![tank_request("ecs"), battery_request(0.7)]);
        assert_eq!(policy.priority_order(&high), vec!["ecs", "battery"]);
    }

    #[test]
    fn unknown_id_falls_back_to_ecs_first() {
        assert_eq!(PriorityPolicy::from_id("nope", 50.0), PriorityPolicy::EcsFirst);
        assert_eq!(
            PriorityPolicy::from_id("battery_first", 50.0),
            PriorityPolicy::BatteryFirst
        );
        for id in STRATEGY_IDS {
            assert_eq!(PriorityPolicy::from_id(id, 50.0).id(), id);
        }
    }

    #[test]
    fn closures_are_strategies() {
        let nothing = |_: &StrategyContext| -> Vec<Allocation> { Vec::new() };
        assert!(Strategy::allocate(&nothing, &ctx(1.0, vec![])).is_empty());
        assert_eq!(Strategy::name(&nothing), "custom");
    }

    #[test]
    fn allocation_is_deterministic() {
        let c = ctx(4.5, vec![tank_request("ecs"), battery_request(0.4)]);
        let policy = PriorityPolicy::MixSoc {
            threshold_pct: 50.0,
        };
        assert_eq!(policy.allocate(&c), policy.allocate(&c));
    }

    fn window(pv_kw: f64, import_price: f64, color: Option<TempoColor>) -> ForecastWindow {
        ForecastWindow {
            samples: (0..24)
                .map(|h| ForecastSample {
                    day: 0,
                    hour: h,
                    pv_kw,
                    ambient_c: 20.0,
                    import_price: if h >= 6 { import_price } else { 0.2 },
                    export_price: 0.1,
                    color,
                })
                .collect(),
        }
    }

    #[test]
    fn lookahead_stores_for_expensive_evening() {
        let s = LookaheadStrategy::default();
        let c = ctx(3.0, vec![]);
        assert_eq!(s.policy(&c, &window(0.1, 0.4, None)), PriorityPolicy::BatteryFirst);
        assert_eq!(s.policy(&c, &window(3.0, 0.4, None)), PriorityPolicy::EcsFirst);
        assert_eq!(s.policy(&c, &window(0.1, 0.21, None)), PriorityPolicy::EcsFirst);
    }

    #[test]
    fn lookahead_red_day_is_battery_first() {
        let s = LookaheadStrategy::default();
        let c = ctx(3.0, vec![]);
        let red = window(5.0, 0.2, Some(TempoColor::Red));
        assert_eq!(s.policy(&c, &red), PriorityPolicy::BatteryFirst);
    }

    #[test]
    fn lookahead_derives_preheat_contract() {
        let base = EcsServiceContract {
            deadline_enabled: false,
            ..Default::default()
        };
        let derived = LookaheadStrategy::default().derive_contract(&base).unwrap();
        assert!(derived.deadline_enabled);
        assert_eq!(derived.preheat_window_h, 2.0);
        assert!(!base.deadline_enabled);
    }
}
