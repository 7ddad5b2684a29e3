use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gerber_plotter::spacial::{Position, Vector};
use gerber_plotter::{resolve_arc_center, QuadrantMode};
use rand::Rng;

struct ArcCase {
    start: Position,
    end: Position,
    ij: Vector,
}

fn generate_random_arcs(count: usize) -> Vec<ArcCase> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let center = Position::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0));
            let radius = rng.gen_range(0.1..50.0);
            let start_angle: f64 = rng.gen_range(0.0..std::f64::consts::PI * 2.0);
            // keep the span below a quadrant so single mode always has a solution
            let end_angle = start_angle + rng.gen_range(0.01..std::f64::consts::PI / 2.0);
            let start = Position::new(
                center.x + radius * start_angle.cos(),
                center.y + radius * start_angle.sin(),
            );
            let end = Position::new(
                center.x + radius * end_angle.cos(),
                center.y + radius * end_angle.sin(),
            );
            ArcCase {
                start,
                end,
                ij: center - start,
            }
        })
        .collect()
}

fn benchmark_arc_center(c: &mut Criterion) {
    let arcs = generate_random_arcs(10000);

    let mut group = c.benchmark_group("Arc center resolution");

    group.bench_function("multi_quadrant", |b| {
        b.iter(|| {
            for arc in &arcs {
                black_box(resolve_arc_center(
                    black_box(arc.start),
                    black_box(arc.end),
                    black_box(arc.ij),
                    QuadrantMode::Multi,
                    false,
                ));
            }
        })
    });

    group.bench_function("single_quadrant", |b| {
        b.iter(|| {
            for arc in &arcs {
                black_box(resolve_arc_center(
                    black_box(arc.start),
                    black_box(arc.end),
                    black_box(Vector::new(arc.ij.x.abs(), arc.ij.y.abs())),
                    QuadrantMode::Single,
                    false,
                ));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_arc_center);
criterion_main!(benches);
