//! Benchmarks for the MediaMirror conversion pipeline.
//!
//! Run with: cargo bench -p mediamirror-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat};
use mediamirror_core::pipeline::{Classifier, DecoderSet, ImagePipeline, ResizeSpec};
use mediamirror_core::types::{ConversionJob, FileTimestamps, MediaFile, MediaKind, PipelineKind};
use mediamirror_core::Config;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

fn benchmark_classify(c: &mut Criterion) {
    let paths: Vec<PathBuf> = [
        "2023/IMG_0001.JPG",
        "2023/vacation.png",
        "raw/DSC01234.ARW",
        "phone/IMG_4242.HEIC",
        "clips/clip.mov",
        "notes/doc.txt",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    c.bench_function("classify", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(Classifier::classify(black_box(path)));
            }
        })
    });
}

fn benchmark_resize_spec(c: &mut Criterion) {
    c.bench_function("resize_spec_even", |b| {
        b.iter(|| ResizeSpec::compute_even(black_box(4000), black_box(2251), black_box(1920)))
    });
}

fn benchmark_image_convert(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("frame.png");
    let mut png = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(3840, 2160)
        .write_to(&mut png, ImageFormat::Png)
        .unwrap();
    std::fs::write(&source, png.into_inner()).unwrap();

    let job = ConversionJob {
        file: MediaFile {
            path: source,
            relative_path: PathBuf::from("frame.png"),
            kind: MediaKind::ImageConvertible,
            size: 0,
            timestamps: FileTimestamps {
                modified: SystemTime::now(),
                accessed: None,
                created: None,
            },
        },
        output_path: dir.path().join(Path::new("out/frame.jpg")),
        pipeline: PipelineKind::Image,
        config: Arc::new(Config::default()),
    };
    let pipeline = ImagePipeline::new(DecoderSet::default());
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("image_convert");
    group.sample_size(10);
    group.bench_function("4k_png_to_1080p_jpeg", |b| {
        b.iter(|| rt.block_on(pipeline.convert(black_box(&job))).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_classify,
    benchmark_resize_spec,
    benchmark_image_convert
);
criterion_main!(benches);
