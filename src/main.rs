//! Home energy simulator entry point: CLI wiring and config-driven runs.

use std::path::Path;
use std::process;

use tracing_subscriber::EnvFilter;

use home_energy_sim::config::ScenarioConfig;
use home_energy_sim::error::SimError;
use home_energy_sim::io::export::export_csv;
use home_energy_sim::sim::engine::simulate;
use home_energy_sim::sim::strategy::{LookaheadStrategy, Reactive, STRATEGY_IDS, Strategy};
use home_energy_sim::sim::types::{SimulationResult, StepRecord};
use home_energy_sim::weekly::{WeeklyComparison, WeeklyResult};

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    strategy: Option<String>,
    weekly: bool,
    seed_override: Option<u64>,
    telemetry_out: Option<String>,
}

fn print_help() {
    eprintln!("home-energy-sim: residential PV, battery and hot-water tank simulator");
    eprintln!();
    eprintln!("Usage: home-energy-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!(
        "  --strategy <id>          Override the strategy ({})",
        STRATEGY_IDS.join(", ")
    );
    eprintln!("  --weekly                 Compare the strategy with the lookahead one over a week");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --telemetry-out <path>   Export step records to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

/// Returns the value following flag `args[*i]`, or exits with an error.
fn flag_value(args: &[String], i: &mut usize, what: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {} requires {what}", args[*i - 1]);
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        strategy: None,
        weekly: false,
        seed_override: None,
        telemetry_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(flag_value(&args, &mut i, "a path argument")),
            "--preset" => cli.preset = Some(flag_value(&args, &mut i, "a name argument")),
            "--strategy" => cli.strategy = Some(flag_value(&args, &mut i, "an id argument")),
            "--weekly" => cli.weekly = true,
            "--seed" => {
                let value = flag_value(&args, &mut i, "a u64 argument");
                if let Ok(s) = value.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{value}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--telemetry-out" => {
                cli.telemetry_out = Some(flag_value(&args, &mut i, "a path argument"));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Runs the first forecast day with the configured strategy.
fn run_daily(cfg: &ScenarioConfig) -> Result<SimulationResult, SimError> {
    let forecast = cfg.forecast()?;
    let mut orchestrator = cfg.orchestrator();
    let input = orchestrator.day_input(&forecast, 0)?;
    simulate(&input, &mut orchestrator.devices, &cfg.strategy())
}

/// Runs the configured strategy and the lookahead strategy over the same week.
fn run_weekly(cfg: &ScenarioConfig) -> Result<(WeeklyResult, WeeklyResult), SimError> {
    let forecast = cfg.forecast()?;
    let baseline = cfg
        .orchestrator()
        .run(&forecast, &Reactive(cfg.strategy()))?;
    let lookahead = cfg
        .orchestrator()
        .run(&forecast, &LookaheadStrategy::default())?;
    Ok((baseline, lookahead))
}

fn print_week(week: &WeeklyResult) {
    println!("=== {} ===", week.strategy);
    for (day, result) in week.days.iter().enumerate() {
        let k = &result.kpis;
        println!(
            "day {day}: net cost {:>6.2} EUR | import {:>6.2} kWh | self-consumption {:>5.1}% | hit rate {:>5.1}%",
            k.net_cost_with_penalties_eur,
            result.totals.grid_import_kwh,
            k.self_consumption * 100.0,
            k.ecs_hit_rate * 100.0,
        );
    }
    println!("\n{}\n", week.kpis);
}

fn write_telemetry(path: &str, records: &[StepRecord]) {
    if let Err(e) = export_csv(records, Path::new(path)) {
        eprintln!("error: failed to write CSV: {e}");
        process::exit(1);
    }
    eprintln!("Telemetry written to {path}");
}

fn main() {
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then baseline default
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(strategy) = cli.strategy {
        scenario.simulation.strategy = strategy;
    }
    if cli.weekly {
        scenario.simulation.weekly = true;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    if scenario.simulation.weekly {
        let (baseline, lookahead) = run_weekly(&scenario).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        });
        print_week(&baseline);
        print_week(&lookahead);
        println!("{}", WeeklyComparison::between(&baseline, &lookahead));

        if let Some(ref path) = cli.telemetry_out {
            let records: Vec<StepRecord> = lookahead
                .days
                .iter()
                .flat_map(|d| d.records.iter().cloned())
                .collect();
            write_telemetry(path, &records);
        }
    } else {
        let result = run_daily(&scenario).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        });
        println!("strategy: {}", scenario.strategy().name());
        for r in &result.records {
            println!("{r}");
        }
        println!("\n{}", result.kpis);

        if let Some(ref path) = cli.telemetry_out {
            write_telemetry(path, &result.records);
        }
    }
}
