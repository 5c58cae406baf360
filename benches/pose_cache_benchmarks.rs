//! Benchmarks for pose cache insertion and lookup

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::seq::SliceRandom;
use swing_analyzer::pose_cache::PoseCache;
use swing_analyzer::pose_track::PoseTrackFrame;
use swing_analyzer::skeleton::KeypointFormat;
use swing_analyzer::utils::content_hash::quick_video_hash;

fn frame(index: u32) -> PoseTrackFrame {
    PoseTrackFrame::empty(index, f64::from(index) / 30.0, KeypointFormat::Coco17)
}

fn filled_cache(frames: u32) -> PoseCache {
    let cache = PoseCache::default();
    for i in 0..frames {
        cache.add_frame(frame(i));
    }
    cache
}

fn benchmark_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_cache_insert");

    for frames in [300u32, 1800, 9000] {
        group.bench_with_input(BenchmarkId::new("in_order", frames), &frames, |b, &frames| {
            b.iter(|| black_box(filled_cache(frames)));
        });

        // Out-of-order arrival, as happens when extraction workers race
        let mut shuffled: Vec<u32> = (0..frames).collect();
        shuffled.shuffle(&mut rand::thread_rng());
        group.bench_with_input(BenchmarkId::new("shuffled", frames), &shuffled, |b, order| {
            b.iter(|| {
                let cache = PoseCache::default();
                for &i in order {
                    cache.add_frame(frame(i));
                }
                black_box(cache.frame_count())
            });
        });
    }

    group.finish();
}

fn benchmark_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_cache_lookup");
    let cache = filled_cache(9000);

    group.bench_function("sequential_playback", |b| {
        b.iter(|| {
            for i in 0..900u32 {
                black_box(cache.get_frame(black_box(f64::from(i) / 30.0)));
            }
        });
    });

    let mut seeks: Vec<f64> = (0..900u32).map(|i| f64::from(i * 10) / 30.0 + 0.004).collect();
    seeks.shuffle(&mut rand::thread_rng());
    group.bench_with_input(BenchmarkId::new("random_seek", seeks.len()), &seeks, |b, seeks| {
        b.iter(|| {
            for &time in seeks {
                black_box(cache.get_frame(black_box(time)));
            }
        });
    });

    group.bench_function("miss_past_end", |b| {
        b.iter(|| black_box(cache.get_frame(black_box(10_000.0))));
    });

    group.finish();
}

fn benchmark_quick_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("quick_video_hash");

    for size in [64 * 1024usize, 4 * 1024 * 1024, 64 * 1024 * 1024] {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(quick_video_hash(black_box(data))));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_insertion, benchmark_lookup, benchmark_quick_hash);
criterion_main!(benches);
