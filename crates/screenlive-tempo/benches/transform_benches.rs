use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use screenlive_tempo::{AudioTransformer, EngineConfig, Interpolation, StretchParams, VoicePreset};

/// 20 ms of stereo 44.1 kHz PCM, the block size a capture callback delivers.
const BLOCK_FRAMES: usize = 882;

fn pcm_block(frames: usize, channels: usize) -> Vec<u8> {
    (0..frames * channels)
        .flat_map(|i| (((i as f32 * 0.031).sin() * 8000.0) as i16).to_le_bytes())
        .collect()
}

/// Benchmark the full pipeline for each voice preset.
fn bench_presets(c: &mut Criterion) {
    let mut group = c.benchmark_group("voice_preset");
    let input = pcm_block(BLOCK_FRAMES, 2);
    group.throughput(Throughput::Bytes(input.len() as u64));

    for preset in VoicePreset::ALL {
        let mut engine = AudioTransformer::new(EngineConfig::default()).unwrap();
        engine.set_audio_format(44100, 2).unwrap();
        engine.apply_preset(preset);
        let mut target = vec![0u8; input.len() * 4];

        group.bench_with_input(BenchmarkId::from_parameter(preset.name()), &preset, |b, _| {
            b.iter(|| {
                let n = engine.process(black_box(&input), &mut target).unwrap();
                black_box(n)
            });
        });
    }

    group.finish();
}

/// Benchmark the rate stage alone with each interpolation kernel.
fn bench_interpolation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_interpolation");
    let input = pcm_block(BLOCK_FRAMES, 2);
    group.throughput(Throughput::Bytes(input.len() as u64));

    for interpolation in [Interpolation::Linear, Interpolation::Cubic, Interpolation::Sinc] {
        let config = EngineConfig::default().with_interpolation(interpolation);
        let mut engine = AudioTransformer::new(config).unwrap();
        engine.set_audio_format(44100, 2).unwrap();
        engine.set_rate(1.25);
        let mut target = vec![0u8; input.len() * 2];

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", interpolation)),
            &interpolation,
            |b, _| {
                b.iter(|| {
                    let n = engine.process(black_box(&input), &mut target).unwrap();
                    black_box(n)
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the WSOLA stretch with full and quick seeking.
fn bench_stretch(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_stretch");
    let input = pcm_block(BLOCK_FRAMES, 2);
    group.throughput(Throughput::Bytes(input.len() as u64));

    for quick_seek in [false, true] {
        let config = EngineConfig::default()
            .with_stretch(StretchParams::default().with_quick_seek(quick_seek));
        let mut engine = AudioTransformer::new(config).unwrap();
        engine.set_audio_format(44100, 2).unwrap();
        engine.set_tempo(1.5);
        let mut target = vec![0u8; input.len() * 2];

        let label = if quick_seek { "quick" } else { "full" };
        group.bench_with_input(BenchmarkId::from_parameter(label), &quick_seek, |b, _| {
            b.iter(|| {
                let n = engine.process(black_box(&input), &mut target).unwrap();
                black_box(n)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_presets, bench_interpolation, bench_stretch);
criterion_main!(benches);
