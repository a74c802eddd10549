//! # rt-engine
//!
//! Embedded runtime auto-tuning for RTune.
//!
//! A [`Region`] wraps one repeatedly executed code section. The host brackets
//! each execution with [`Region::begin`] and [`Region::end`]; in between, the
//! region samples its variables, derives functions from them, and lets its
//! objectives search the variables' domains until a configuration is
//! confirmed and applied. Regions live in a host-owned [`Registry`].

mod events;
mod function;
mod objective;
mod region;
mod registry;
mod trace;
mod variable;

pub use events::{TuningEvent, TuningEventKind};
pub use function::{
    Function, FunctionBuilder, FunctionId, FunctionKind, Input, InputRow, ModelKind,
};
pub use objective::{
    ConfigRow, MetCallback, Objective, ObjectiveId, ObjectiveKind, ObjectiveMode, ObjectiveOutcome,
};
pub use region::{Barrier, Region, RegionCallback, RegionId};
pub use registry::{ObjectiveSummary, RegionSummary, Registry};
pub use trace::SampleCallback;
pub use variable::{Domain, Variable, VariableId, VariableKind, MAX_RANGE_VALUES};

#[cfg(test)]
mod tests {
    use super::*;
    use rt_types::{
        Applier, ApplyPolicy, Capacities, DataType, EntityKind, Fidelity, ObjectiveStatus,
        Provider, RegionStatus, RtError, SearchKind, Slot, TuningConfig, UpdatePolicy, Value,
    };
    use std::sync::{Arc, Mutex};

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    fn region(name: &str) -> Region {
        Region::new(name, TuningConfig::default().with_seed(42)).unwrap()
    }

    fn step(region: &mut Region) {
        region.begin();
        region.end();
    }

    /// Region with a MIN objective over the identity of `x` in [1, 2, 4, 8].
    fn min_region() -> (Region, VariableId, ObjectiveId) {
        let mut r = region("min");
        let x = r.add_list("x", DataType::Int, 32, ints(&[1, 2, 4, 8]), None).unwrap();
        let f = r.add_linear("f", DataType::Int, 32, &[x.into()], vec![]).unwrap();
        let o = r.add_min("fastest", f).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
        (r, x, o)
    }

    #[test]
    fn min_meets_after_one_pass_and_retires() {
        let (mut r, x, o) = min_region();
        for _ in 0..3 {
            step(&mut r);
            assert!(!r.is_met(o).unwrap());
        }
        step(&mut r);
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.objective(o).unwrap().status(), ObjectiveStatus::InAction);
        assert_eq!(r.variable(x).unwrap().index(), Some(0));
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(1));
        assert_eq!(r.status(), RegionStatus::AllObjectivesMet);

        step(&mut r);
        assert_eq!(r.objective(o).unwrap().status(), ObjectiveStatus::Retired);
        assert_eq!(r.status(), RegionStatus::Complete);

        // Tuning is over: the counter runs but nothing is sampled.
        let samples = r.variable(x).unwrap().history().len();
        step(&mut r);
        assert_eq!(r.count(), 6);
        assert_eq!(r.variable(x).unwrap().history().len(), samples);
        assert_eq!(r.read_variable(x).unwrap(), Value::Int(1));
    }

    #[test]
    fn min_reports_events_and_outcome() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (r, _, o) = min_region();
        let mut r = r.with_event_sink(tx);
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        r.add_callback(o, Box::new(move |out| sink.lock().unwrap().push(out.clone())))
            .unwrap();
        for _ in 0..5 {
            step(&mut r);
        }
        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&TuningEventKind::ConfigurationApplied {
            variable: "x".into(),
            value: Value::Int(1),
            deferred: false,
        }));
        assert!(kinds.contains(&TuningEventKind::ObjectiveRetired {
            objective: "fastest".into()
        }));
        assert!(matches!(
            kinds.last(),
            Some(TuningEventKind::RegionStatusChanged { to: RegionStatus::Complete, .. })
        ));
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].score, 1.0);
        assert_eq!(outcomes[0].config, vec![("x".to_string(), Value::Int(1))]);
    }

    #[test]
    fn intersection_breaks_ties_toward_lower_index() {
        // |x - (3 - x)| = |2x - 3| ties at x = 1 and x = 2.
        let build = || {
            let mut r = region("cross");
            let x = r.add_range("x", DataType::Int, 16, 0.0, 4.0, 1.0).unwrap();
            let a = r.add_linear("a", DataType::Int, 16, &[x.into()], vec![]).unwrap();
            let b = r.add_linear("b", DataType::Int, 16, &[x.into()], vec![-1.0, 3.0]).unwrap();
            let o = r.add_intersection("cross", a, b).unwrap();
            r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
            (r, x, o)
        };

        let (mut r, x, o) = build();
        for _ in 0..4 {
            step(&mut r);
        }
        assert!(!r.is_met(o).unwrap());
        step(&mut r);
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.chosen_index(o, x).unwrap(), Some(1));
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(1));

        let (mut r, x, o) = build();
        r.set_preference(o, x, true).unwrap();
        for _ in 0..5 {
            step(&mut r);
        }
        assert_eq!(r.chosen_index(o, x).unwrap(), Some(2));
    }

    #[test]
    fn ninth_variable_is_rejected() {
        let mut r = region("full");
        let ids: Vec<_> = (0..8)
            .map(|i| r.add_counter(&format!("v{i}"), DataType::Int, 4).unwrap())
            .collect();
        let err = r.add_counter("v8", DataType::Int, 4).unwrap_err();
        assert!(matches!(err, RtError::CapacityExceeded { kind: EntityKind::Variable, limit: 8 }));
        assert_eq!(r.variables().count(), 8);
        for (i, id) in ids.into_iter().enumerate() {
            assert_eq!(r.variable(id).unwrap().name(), format!("v{i}"));
        }
    }

    #[test]
    fn noisy_samples_never_meet_with_tight_tolerance() {
        let mut r = region("noisy");
        let x = r.add_list("x", DataType::Int, 64, ints(&[1, 2, 4, 8]), None).unwrap();
        let mut k = 0u32;
        let noise = r
            .add_external(
                "noise",
                DataType::Double,
                64,
                Provider::callable(move || {
                    k += 1;
                    Value::Double(0.001 * f64::from(k))
                }),
            )
            .unwrap();
        let f = r.add_linear("f", DataType::Double, 64, &[x.into(), noise.into()], vec![]).unwrap();
        let o = r.add_min("o", f).unwrap();
        r.set_fidelity_attr(o, 1e-9, 2, 4).unwrap();
        for _ in 0..40 {
            step(&mut r);
        }
        assert!(!r.is_met(o).unwrap());
        assert_eq!(r.objective(o).unwrap().streak(), 0);
    }

    #[test]
    fn stable_samples_meet_after_two_windows() {
        let mut r = region("stable");
        let x = r.add_list("x", DataType::Int, 64, ints(&[1, 2, 4, 8]), None).unwrap();
        let f = r.add_linear("f", DataType::Int, 64, &[x.into()], vec![]).unwrap();
        let o = r.add_min("o", f).unwrap();
        r.set_fidelity_attr(o, 1e-9, 2, 4).unwrap();
        for _ in 0..7 {
            step(&mut r);
        }
        assert!(!r.is_met(o).unwrap());
        assert_eq!(r.objective(o).unwrap().streak(), 1);
        step(&mut r);
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(1));
    }

    /// MIN over `x` in [1, 2, 4, 8] with the history of `x` bounded at
    /// `capacity`. Returns the region and the step at which it was met.
    fn bounded_min(capacity: usize) -> (Region, VariableId, Option<usize>) {
        let mut r = region("bounded");
        let x = r.add_list("x", DataType::Int, capacity, ints(&[1, 2, 4, 8]), None).unwrap();
        let f = r.add_linear("f", DataType::Int, 64, &[x.into()], vec![]).unwrap();
        let o = r.add_min("o", f).unwrap();
        r.set_fidelity_attr(o, 1e-9, 3, 4).unwrap();
        let met_at = (1..=40).find(|_| {
            step(&mut r);
            r.is_met(o).unwrap()
        });
        (r, x, met_at)
    }

    #[test]
    fn full_variable_history_keeps_configurations_aligned() {
        let (_, _, roomy) = bounded_min(64);
        let (r, x, bounded) = bounded_min(8);
        assert_eq!(roomy, Some(12));
        assert_eq!(bounded, roomy);
        assert_eq!(r.variable(x).unwrap().history().len(), 8);
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(1));

        let f = r.functions().next().map(|(id, _)| id).unwrap();
        let rows = r.function(f).unwrap().input_table();
        assert_eq!(rows.len(), 12);
        let tail: Vec<_> = rows[8..].iter().map(|row| row.index_of(x)).collect();
        assert_eq!(tail, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn intersection_of_measured_functions_scans_the_sample_window() {
        let mut r = region("measured");
        let mut readings = [5, 4, 3, 3, 6].into_iter().cycle();
        let a = r
            .add_external(
                "a",
                DataType::Int,
                16,
                Provider::callable(move || Value::Int(readings.next().unwrap_or(0))),
            )
            .unwrap();
        let b = r
            .add_external("b", DataType::Int, 16, Provider::callable(|| Value::Int(3)))
            .unwrap();
        let fa = r.add_linear("fa", DataType::Int, 16, &[a.into()], vec![]).unwrap();
        let fb = r.add_linear("fb", DataType::Int, 16, &[b.into()], vec![]).unwrap();
        let o = r.add_intersection("cross", fa, fb).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 0).unwrap();
        r.set_sample_attr(o, 0, Some(5), 1, 1).unwrap();
        for _ in 0..4 {
            step(&mut r);
            assert!(!r.is_met(o).unwrap());
        }
        step(&mut r);
        assert!(r.is_met(o).unwrap());
        // |a - b| is [2, 1, 0, 0, 3]; the earlier of the tied zeros wins.
        let outcome = r.objective(o).unwrap().outcome().cloned().unwrap();
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.sample, 2);
        assert!(outcome.config.is_empty());
    }

    #[test]
    fn threshold_up_picks_first_index_reaching_target() {
        let mut r = region("threshold");
        let x = r.add_range("x", DataType::Int, 16, 0.0, 7.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Int, 16, &[x.into()], vec![]).unwrap();
        let o = r.add_threshold_objective("enough", ObjectiveKind::ThresholdUp, f, 5).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
        for _ in 0..8 {
            step(&mut r);
        }
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.chosen_index(o, x).unwrap(), Some(5));
        assert_eq!(r.objective(o).unwrap().outcome().unwrap().score, 5.0);
    }

    #[test]
    fn select_reports_winning_function() {
        let mut r = region("select");
        let x = r.add_list("x", DataType::Int, 16, ints(&[1, 2, 4, 8]), None).unwrap();
        let direct = r.add_linear("direct", DataType::Double, 16, &[x.into()], vec![]).unwrap();
        let flat = r.add_linear("flat", DataType::Double, 16, &[x.into()], vec![0.0, 2.5]).unwrap();
        let o = r.add_select2("cheapest", ObjectiveKind::SelectMin, direct, flat).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
        for _ in 0..4 {
            step(&mut r);
        }
        let outcome = r.objective(o).unwrap().outcome().cloned().unwrap();
        assert_eq!(outcome.selected, Some(0));
        assert_eq!(outcome.config, vec![("x".to_string(), Value::Int(1))]);
    }

    /// Drive `r` with a cost computed from the current value of `x` until
    /// `o` is met or `limit` iterations pass. Returns the iterations used.
    fn drive(
        r: &mut Region,
        x: VariableId,
        o: ObjectiveId,
        cost: Slot,
        limit: usize,
        f: impl Fn(f64) -> f64,
    ) -> usize {
        for i in 0..limit {
            r.begin();
            cost.set(f(r.variable(x).unwrap().value().as_f64()));
            r.end();
            if r.is_met(o).unwrap() {
                return i + 1;
            }
        }
        limit
    }

    fn bowl(search: SearchKind, size: f64) -> (Region, VariableId, ObjectiveId, Slot) {
        let mut r = Region::new("bowl", TuningConfig::default().with_seed(5).with_search(search)).unwrap();
        let x = r.add_range("x", DataType::Int, 128, 0.0, size - 1.0, 1.0).unwrap();
        let cost = Slot::new(0.0);
        let t = r
            .add_model(ModelKind::Implicit, "t", DataType::Double, 128, Provider::slot(cost.clone()), &[x.into()])
            .unwrap();
        let o = r.add_min("o", t).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
        (r, x, o, cost)
    }

    #[test]
    fn binary_gradient_follows_slope_to_minimum() {
        let (mut r, x, o, cost) = bowl(SearchKind::BinaryGradient, 64.0);
        assert_eq!(r.variable(x).unwrap().policy(), UpdatePolicy::FollowObjective);
        let used = drive(&mut r, x, o, cost, 64, |v| (v - 41.0).abs());
        assert!(r.is_met(o).unwrap());
        assert!(used < 64, "gradient search should beat a full sweep, used {used}");
        assert_eq!(r.chosen_index(o, x).unwrap(), Some(41));
    }

    #[test]
    fn nelder_mead_finds_bowl_minimum() {
        let (mut r, x, o, cost) = bowl(SearchKind::NelderMead, 16.0);
        drive(&mut r, x, o, cost, 100, |v| (v - 11.0).powi(2));
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(11));
    }

    #[test]
    fn on_read_apply_waits_for_host_read() {
        let (mut r, x, o) = min_region();
        let target = Slot::new(0);
        r.set_applier(x, Applier::slot(target.clone()), ApplyPolicy::OnUpdate).unwrap();
        r.set_objective_apply_policy(o, x, ApplyPolicy::OnRead).unwrap();
        for _ in 0..5 {
            step(&mut r);
        }
        // Sampling applied every selection; the configuration is deferred.
        assert_eq!(target.get(), Value::Int(8));
        assert!(r.variable(x).unwrap().is_apply_pending());
        assert_eq!(r.status(), RegionStatus::TuningComplete);

        assert_eq!(r.read_variable(x).unwrap(), Value::Int(1));
        assert_eq!(target.get(), Value::Int(1));
        step(&mut r);
        assert_eq!(r.status(), RegionStatus::Complete);
    }

    #[test]
    fn continuous_objective_resumes_and_meets_again() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (r, x, o) = min_region();
        let mut r = r.with_event_sink(tx);
        r.set_mode(o, ObjectiveMode::Continuous { retune_interval: 2 }).unwrap();
        for _ in 0..6 {
            step(&mut r);
        }
        assert_eq!(r.objective(o).unwrap().status(), ObjectiveStatus::Sampling);
        assert_eq!(r.status(), RegionStatus::Tuning);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e.kind, TuningEventKind::ObjectiveResumed { .. })));

        for _ in 0..4 {
            step(&mut r);
        }
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.status(), RegionStatus::AllObjectivesMet);
        assert_eq!(r.variable(x).unwrap().count_value(), &[2, 2, 2, 2]);
    }

    #[test]
    fn batches_feed_one_sample_per_configuration() {
        let mut r = region("batched");
        let x = r.add_list("x", DataType::Int, 16, ints(&[3, 1, 2]), None).unwrap();
        let f = r
            .add_function(
                FunctionBuilder::new(FunctionKind::Linear, "f", DataType::Int, 16)
                    .input(x)
                    .policy(UpdatePolicy::Accumulate),
            )
            .unwrap();
        let o = r.add_min("o", f).unwrap();
        r.set_fidelity_attr(o, 0.0, 1, 1).unwrap();
        r.set_sample_attr(o, 0, None, 2, 2).unwrap();
        for _ in 0..5 {
            step(&mut r);
        }
        assert!(!r.is_met(o).unwrap());
        step(&mut r);
        // Each configuration is held for a batch of two iterations.
        assert_eq!(r.variable(x).unwrap().sample_iterations(), &[0, 2, 4]);
        assert_eq!(r.function(f).unwrap().history().to_f64_vec(), vec![6.0, 2.0, 4.0]);
        assert!(r.is_met(o).unwrap());
        assert_eq!(r.variable(x).unwrap().value(), Value::Int(1));
    }

    #[test]
    fn custom_capacities_apply_per_region() {
        let config = TuningConfig::default()
            .with_seed(1)
            .with_capacities(Capacities {
                max_objectives: 1,
                ..Capacities::default()
            })
            .with_fidelity(Fidelity {
                deviation_tolerance: 0.0,
                fidelity_window: 1,
                lookup_window: 1,
            });
        let mut r = Region::new("tight", config).unwrap();
        let x = r.add_boolean("flag", 8).unwrap();
        let f = r.add_linear("f", DataType::Int, 8, &[x.into()], vec![]).unwrap();
        let o = r.add_max("o", f).unwrap();
        assert!(matches!(
            r.add_min("other", f),
            Err(RtError::CapacityExceeded { kind: EntityKind::Objective, .. })
        ));
        assert_eq!(r.objective(o).unwrap().fidelity().fidelity_window, 1);
        step(&mut r);
        step(&mut r);
        assert_eq!(r.read_variable(x).unwrap(), Value::Int(1));
    }
}
