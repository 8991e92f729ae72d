//! Scheduler benchmark: one evaluation step per trigger, and a live
//! process-table lookup (the dominant cost of a poll).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procwarden::config::TargetSpec;
use procwarden::probe::{Probe, ProcessHandle, ProcessProbe};
use procwarden::scheduler::{evaluate, ScanState, Trigger};
use procwarden::terminate::{Outcome, Terminate};
use std::time::Instant;

struct Fixed(bool);

impl Probe for Fixed {
    fn find_target(&self, spec: &TargetSpec) -> Option<ProcessHandle> {
        self.0.then(|| ProcessHandle::new(4242, spec.name()))
    }
}

struct Denied;

impl Terminate for Denied {
    fn terminate(&self, _handle: &ProcessHandle) -> Outcome {
        Outcome::AccessDenied
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let spec = TargetSpec::default();

    c.bench_function("evaluate_absent", |b| {
        let mut state = ScanState::new(&spec);
        b.iter(|| {
            black_box(evaluate(
                &mut state,
                &spec,
                Instant::now(),
                Trigger::Timer,
                true,
                &Fixed(false),
                &Denied,
            ))
        })
    });

    c.bench_function("evaluate_denied_with_backoff", |b| {
        let mut state = ScanState::new(&spec);
        b.iter(|| {
            black_box(evaluate(
                &mut state,
                &spec,
                Instant::now(),
                Trigger::Event,
                true,
                &Fixed(true),
                &Denied,
            ))
        })
    });
}

fn bench_process_probe(c: &mut Criterion) {
    let spec = TargetSpec::default();
    let probe = ProcessProbe::new();
    c.bench_function("process_probe_refresh", |b| {
        b.iter(|| black_box(probe.find_target(&spec)))
    });
}

criterion_group!(benches, bench_evaluate, bench_process_probe);
criterion_main!(benches);
