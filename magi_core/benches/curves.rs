use criterion::{Criterion, black_box, criterion_group, criterion_main};
use magi_core::{AnalysisParams, RawWellSample, WellLayout, analyze_samples, dsp::butter_lowpass};

// Synthetic plate: logistic amplification per well plus xorshift noise
fn synth_plate(n: usize, wells: usize, seed: u32) -> Vec<RawWellSample> {
    let mut state = seed.max(1);
    let mut noise = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0) - 0.5
    };
    (0..n)
        .map(|i| {
            let m = i as f64 * 0.1; // 6 s steps
            RawWellSample {
                timestamp: 1_700_000_000 + i as i64 * 6,
                values: (0..wells)
                    .map(|w| {
                        let onset = 5.0 + (w % 16) as f64;
                        30.0 + 180.0 / (1.0 + (-(m - onset) * 1.5).exp()) + 4.0 * noise()
                    })
                    .collect(),
            }
        })
        .collect()
}

pub fn bench_analysis(c: &mut Criterion) {
    let mut g = c.benchmark_group("analysis");
    // BENCH_SAMPLE_SIZE=10 cargo bench -p magi_core --bench curves
    let samples = std::env::var("BENCH_SAMPLE_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(30);
    g.sample_size(samples.max(10));

    let layout = WellLayout::grid(8, 12).unwrap();
    for &n in &[200usize, 600] {
        let plate = synth_plate(n, layout.well_count(), 0xC0FFEE);
        g.bench_function(format!("plate_96x{n}"), |b| {
            b.iter(|| {
                let out = analyze_samples(black_box(&plate), &AnalysisParams::default(), &layout);
                black_box(out.unwrap());
            });
        });
    }

    let sos = butter_lowpass(6, 0.1).unwrap();
    let trace: Vec<f64> = synth_plate(2_000, 1, 7)
        .into_iter()
        .map(|s| s.values[0])
        .collect();
    g.bench_function("filtfilt_2000", |b| {
        b.iter(|| black_box(sos.filtfilt(black_box(&trace))));
    });
    g.finish();
}

criterion_group!(curves, bench_analysis);
criterion_main!(curves);
