#[macro_use]
extern crate criterion;

use criterion::Criterion;

extern crate powerpush;

use powerpush::metric::{Labels, Sample, SeriesBatch};
use powerpush::protocols::remote_write::WriteRequest;

const RAILS: &[&str] = &[
    "VDD_GPU_SOC",
    "VDD_CPU_CV",
    "VIN_SYS_5V0",
    "VDDQ_VDD2_1V8AO",
    "total",
];

/// One push cycle's worth of rail readings: 4 s of 10 Hz scrapes.
fn cycle() -> Vec<Sample> {
    let mut samples = Vec::new();
    for tick in 0..40i64 {
        let ts = 1_735_689_600_000 + tick * 100;
        for rail in RAILS {
            for metric in &["agx_orin_voltage_volts", "agx_orin_current_amps", "agx_orin_power_watts"] {
                let labels: Labels = vec![("component", *rail), ("source", "agx-orin")]
                    .into_iter()
                    .collect();
                samples.push(Sample::with_labels(*metric, labels, tick as f64, ts).unwrap());
            }
        }
    }
    samples
}

fn benchmark(c: &mut Criterion) {
    let samples = cycle();
    c.bench_function("series_batch_group", |b| {
        b.iter(|| SeriesBatch::from_samples(&samples));
    });

    let batch = SeriesBatch::from_samples(&samples);
    c.bench_function("write_request_encode", |b| {
        b.iter(|| WriteRequest::from_batch(&batch).encode().unwrap());
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
