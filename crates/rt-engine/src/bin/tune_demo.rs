use anyhow::Context;
use rt_engine::{ModelKind, Registry, TuningEventKind};
use rt_types::{Applier, ApplyPolicy, DataType, Provider, Slot, TuningConfig, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Simulated cost of one loop execution with `threads` workers: parallel
/// speedup against a synchronisation overhead that grows with the team.
fn simulated_time(threads: f64) -> f64 {
    120.0 / threads + 4.0 * threads
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("RTUNE_CONFIG") {
        Ok(path) => TuningConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => TuningConfig::default().with_seed(2024),
    };
    let iterations: u64 = std::env::var("RTUNE_ITERATIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(40);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut registry = Registry::new(config)?.with_event_sink(tx);
    let id = registry.init_region("parallel-loop")?;
    let region = registry.region_mut(id)?;

    let team = Slot::new(1);
    let elapsed = Slot::new(0.0);
    let threads = region.add_list(
        "threads",
        DataType::Int,
        64,
        [1, 2, 4, 6, 8, 12, 16].into_iter().map(Value::Int).collect(),
        None,
    )?;
    region.set_applier(threads, Applier::slot(team.clone()), ApplyPolicy::OnUpdate)?;
    let time = region.add_model(
        ModelKind::Unimodal,
        "time",
        DataType::Double,
        64,
        Provider::slot(elapsed.clone()),
        &[threads.into()],
    )?;
    let objective = region.add_min("fastest", time)?;

    for _ in 0..iterations {
        region.begin();
        elapsed.set(simulated_time(team.get().as_f64()));
        region.end();
        if region.status().is_tuning_done() {
            break;
        }
    }

    if let Ok(fit) = region.fit_model(time) {
        info!(r_squared = fit.r_squared, vertex = ?fit.vertex(), "time model fitted");
    }
    println!("{}", region.describe_domain(threads)?);
    print!("{}", region.format_function_history(time)?);
    if let Some(outcome) = region.objective(objective)?.outcome() {
        info!(score = outcome.score, config = ?outcome.config, "tuned");
    }

    for event in rx.try_iter() {
        if let TuningEventKind::ConfigurationApplied { variable, value, .. } = &event.kind {
            println!("[{}] {} = {}", event.iteration, variable, value);
        }
    }

    let summaries = registry.teardown();
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
