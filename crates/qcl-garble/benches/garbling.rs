use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use qcl::{Op, Wire};
use qcl_garble::{Evaluator, Garbler};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const GATES: u64 = 10_000;

fn bench_garble(c: &mut Criterion) {
    let mut group = c.benchmark_group("garble");
    group.throughput(Throughput::Elements(GATES));

    for op in [Op::Xor, Op::And] {
        group.bench_function(format!("{op}"), |b| {
            b.iter(|| {
                let mut garbler = Garbler::new(ChaCha20Rng::seed_from_u64(0));
                garbler.alloc(Wire(2));
                garbler.alloc(Wire(3));
                for i in 0..GATES {
                    garbler
                        .garble(op, Wire(2), Wire(3), Wire(4 + i as u32))
                        .unwrap();
                }
            })
        });
    }
    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    let mut garbler = Garbler::new(ChaCha20Rng::seed_from_u64(0));
    garbler.alloc(Wire(2));
    garbler.alloc(Wire(3));
    let frames: Vec<_> = (0..GATES)
        .map(|i| {
            garbler
                .garble(Op::And, Wire(2), Wire(3), Wire(4 + i as u32))
                .unwrap()
        })
        .collect();
    let a = garbler.active_label(Wire(2), true).unwrap();
    let b = garbler.active_label(Wire(3), false).unwrap();

    let mut group = c.benchmark_group("eval");
    group.throughput(Throughput::Elements(GATES));
    group.bench_function("AND", |bch| {
        bch.iter(|| {
            let mut evaluator = Evaluator::new();
            evaluator.set_label(Wire(2), a);
            evaluator.set_label(Wire(3), b);
            for frame in &frames {
                evaluator.eval_gate(frame).unwrap();
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_garble, bench_eval);
criterion_main!(benches);
