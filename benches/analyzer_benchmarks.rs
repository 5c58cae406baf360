//! Benchmarks for per-frame analysis cost

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swing_analyzer::biomechanics::BiomechanicsAnalyzer;
use swing_analyzer::config::BiomechanicsConfig;
use swing_analyzer::filters::create_filter;
use swing_analyzer::form_analyzer::peak_detector::find_peaks;
use swing_analyzer::form_analyzer::{FormAnalyzer, KettlebellSwingAnalyzer};
use swing_analyzer::skeleton::{Keypoint, Skeleton};

/// Synthetic swing sampled at 30 fps, about two seconds per rep
fn swing_sequence(reps: usize) -> Vec<Skeleton> {
    let frames_per_rep = 60;
    (0..reps * frames_per_rep)
        .map(|i| {
            let phase = (i % frames_per_rep) as f64 / frames_per_rep as f64 * std::f64::consts::TAU;
            // Spine lean 3..63, arm swings from overhead-ish to between the legs
            let spine = (33.0 - 30.0 * phase.cos()).to_radians();
            let arm = (27.5 + 57.5 * phase.cos()).to_radians();
            let thigh = (10.0 - 10.0 * phase.cos()).to_radians();
            swing_pose(spine, arm, thigh)
        })
        .collect()
}

fn swing_pose(spine: f64, arm: f64, thigh: f64) -> Skeleton {
    let hip = (300.0, 400.0);
    let shoulder = (hip.0 + 150.0 * spine.sin(), hip.1 - 150.0 * spine.cos());
    let wrist = (shoulder.0 + 130.0 * arm.sin(), shoulder.1 + 130.0 * arm.cos());
    let elbow = ((shoulder.0 + wrist.0) / 2.0, (shoulder.1 + wrist.1) / 2.0);
    let knee = (hip.0 + 120.0 * thigh.sin(), hip.1 + 120.0 * thigh.cos());
    let ankle = (knee.0, knee.1 + 120.0);

    let mut keypoints = vec![Keypoint::new(shoulder.0, shoulder.1 - 40.0, 0.9); 17];
    for (indices, point) in [
        ([5, 6], shoulder),
        ([7, 8], elbow),
        ([9, 10], wrist),
        ([11, 12], hip),
        ([13, 14], knee),
        ([15, 16], ankle),
    ] {
        for i in indices {
            keypoints[i] = Keypoint::new(point.0, point.1, 0.9);
        }
    }
    Skeleton::new(keypoints)
}

fn benchmark_skeleton_angles(c: &mut Criterion) {
    let skeleton = swing_pose(0.5, 0.2, 0.1);
    c.bench_function("skeleton_angles", |b| {
        b.iter(|| black_box(black_box(&skeleton).angles()));
    });
}

fn benchmark_form_analyzer(c: &mut Criterion) {
    let mut group = c.benchmark_group("form_analyzer");

    for reps in [1usize, 10, 50] {
        let sequence = swing_sequence(reps);
        group.bench_with_input(BenchmarkId::new("process_sequence", reps), &sequence, |b, sequence| {
            let mut analyzer = KettlebellSwingAnalyzer::with_defaults().unwrap();
            b.iter(|| {
                analyzer.reset();
                for (i, skeleton) in sequence.iter().enumerate() {
                    let time = i as f64 / 30.0;
                    black_box(analyzer.process_frame(skeleton, time * 1000.0, Some(time)).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_biomechanics(c: &mut Criterion) {
    let mut group = c.benchmark_group("biomechanics");
    let sequence = swing_sequence(5);

    group.bench_with_input(BenchmarkId::new("add_frame", sequence.len()), &sequence, |b, sequence| {
        let mut analyzer = BiomechanicsAnalyzer::new(&BiomechanicsConfig::default()).unwrap();
        b.iter(|| {
            analyzer.reset();
            for (i, skeleton) in sequence.iter().enumerate() {
                black_box(analyzer.add_frame(skeleton, i as f64 * 1000.0 / 30.0));
            }
            black_box(analyzer.velocity())
        });
    });

    for filter_type in ["none", "moving_average", "exponential"] {
        let mut filter = create_filter(filter_type, 0.3).unwrap();
        group.bench_function(BenchmarkId::new("smoothing", filter_type), |b| {
            b.iter(|| {
                filter.reset();
                for i in 0..300 {
                    black_box(filter.apply(black_box(f64::from(i).sin())));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_find_peaks(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_peaks");

    for len in [300usize, 3000, 30000] {
        let signal: Vec<f64> = (0..len)
            .map(|i| (i as f64 * 0.1).sin() + 0.05 * rand::random::<f64>())
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &signal, |b, signal| {
            b.iter(|| black_box(find_peaks(black_box(signal), 15, None)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_skeleton_angles,
    benchmark_form_analyzer,
    benchmark_biomechanics,
    benchmark_find_peaks
);
criterion_main!(benches);
