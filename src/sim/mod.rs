/// Priority-ordered power allocation primitive.
pub mod allocation;
/// Simulation clock for timestep management.
pub mod clock;
/// Hot-water service contract, hysteresis and deadline helpers.
pub mod ecs;
pub mod engine;
/// Directed energy flows per step.
pub mod flows;
pub mod kpi;
pub mod strategy;
pub mod types;

pub use allocation::{Allocation, PowerDemand, allocate};
pub use ecs::{EcsMode, EcsServiceContract};
pub use engine::{Engine, simulate};
pub use kpi::KpiReport;
pub use strategy::{ForecastStrategy, LookaheadStrategy, PriorityPolicy, Reactive, Strategy};
pub use types::{SimulationInput, SimulationResult, StepRecord, Totals};
