//! Integration tests for the evaluation pipeline.
//!
//! These tests run tiny models end to end on synthetic images written to a
//! temporary directory: manifest, preprocessing, inference, result CSV,
//! metrics and image logging.

use std::fs;
use std::path::{Path, PathBuf};

use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use rand::prelude::*;

use attnmel::eval::{attention_tag, evaluate, EvalOptions, TAG_IMAGE, TAG_PR_CURVE};
use attnmel_core::Seed;
use attnmel_data::{read_results, ImageDataset, ImageLoader, Manifest, Preprocess};
use attnmel_explain::PngDirSink;
use attnmel_models::{
    AttentionNormalization, AttnVgg, AttnVggConfig, BackboneConfig, ModelCheckpoint, Vgg,
    VggConfig,
};

type TestBackend = NdArray<f32>;

const N_SAMPLES: usize = 6;

/// Write random images and a manifest with alternating labels.
fn create_synthetic_dataset(dir: &Path) -> PathBuf {
    let mut rng = Seed::new(42).to_rng();
    let mut manifest = String::new();

    for i in 0..N_SAMPLES {
        let name = format!("ISIC_{:07}.png", i);
        let image = RgbImage::from_fn(48, 48, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));
        image.save(dir.join(&name)).unwrap();
        manifest.push_str(&format!("{},seg_{}.png,{}\n", name, i, i % 2));
    }

    let path = dir.join("test.csv");
    fs::write(&path, manifest).unwrap();
    path
}

fn loader(manifest: &Path) -> ImageLoader {
    let dataset = ImageDataset::open(manifest, Preprocess::isic().with_sizes(40, 32)).unwrap();
    ImageLoader::builder(dataset).batch_size(4).build().unwrap()
}

fn tiny_backbone() -> BackboneConfig {
    BackboneConfig::vgg16_bn()
        .with_widths([4, 4, 8, 8, 8])
        .with_convs([1, 1, 1, 1, 1])
}

fn attn_config(attention: bool) -> AttnVggConfig {
    AttnVggConfig::new(2, attention, AttentionNormalization::Softmax)
        .with_third_head(true)
        .with_attn_features(4)
        .with_backbone(tiny_backbone())
}

#[test]
fn test_attention_evaluation_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let loader = loader(&manifest);

    let device = Default::default();
    Seed::new(7).seed_backend::<TestBackend>();
    let model: AttnVgg<TestBackend> = attn_config(true).init(&device);

    let results = dir.path().join("test_results.csv");
    let mut sink = PngDirSink::new(dir.path().join("log_test")).unwrap();
    let summary = evaluate(
        &model,
        &loader,
        &device,
        &results,
        Some(&mut sink),
        EvalOptions::default(),
    )
    .unwrap();

    assert_eq!(summary.n_samples, N_SAMPLES);
    assert!((summary.accuracy() - summary.report.accuracy).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&summary.report.auc));
    assert!((0.0..=1.0).contains(&summary.report.mean_average_precision));

    let rows = read_results(&results).unwrap();
    assert_eq!(rows.len(), N_SAMPLES);
    for row in &rows {
        assert_eq!(row.len(), 2);
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    // one image grid and three overlays per batch, one PR curve
    for step in 0..2 {
        assert!(sink.path_for(TAG_IMAGE, step).exists());
        for k in 1..=3 {
            assert!(sink.path_for(&attention_tag(k), step).exists());
        }
    }
    assert!(sink.path_for(TAG_PR_CURVE, 0).exists());

    // the first batch logs a 4-wide grid of 32px tiles
    let grid = image::open(sink.path_for(TAG_IMAGE, 0)).unwrap();
    assert_eq!((grid.width(), grid.height()), (138, 36));
}

#[test]
fn test_pooled_model_logs_no_attention() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let loader = loader(&manifest);

    let device = Default::default();
    let model: AttnVgg<TestBackend> = attn_config(false).init(&device);

    let mut sink = PngDirSink::new(dir.path().join("log_test")).unwrap();
    let summary = evaluate(
        &model,
        &loader,
        &device,
        dir.path().join("results.csv"),
        Some(&mut sink),
        EvalOptions::default(),
    )
    .unwrap();

    assert_eq!(summary.n_samples, N_SAMPLES);
    assert!(sink.path_for(TAG_IMAGE, 0).exists());
    assert!(!sink.root().join("test/attention_map_1").exists());
}

#[test]
fn test_restored_checkpoint_reproduces_results() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let loader = loader(&manifest);
    let device = Default::default();

    Seed::new(1).seed_backend::<TestBackend>();
    let model: AttnVgg<TestBackend> = attn_config(true).init(&device);
    let checkpoint = dir.path().join("net.mpk");
    model.save_checkpoint(&checkpoint).unwrap();

    Seed::new(2).seed_backend::<TestBackend>();
    let restored = attn_config(true)
        .init::<TestBackend>(&device)
        .load_checkpoint(&checkpoint, &device)
        .unwrap();

    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    evaluate(&model, &loader, &device, &first, None, EvalOptions::default()).unwrap();
    evaluate(&restored, &loader, &device, &second, None, EvalOptions::default()).unwrap();

    let a = read_results(&first).unwrap();
    let b = read_results(&second).unwrap();
    for (ra, rb) in a.iter().zip(&b) {
        for (x, y) in ra.iter().zip(rb) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}

#[test]
fn test_vgg_baseline_evaluates_generically() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let loader = loader(&manifest);

    let device = Default::default();
    let model: Vgg<TestBackend> = VggConfig::new(2)
        .with_hidden(8)
        .with_backbone(tiny_backbone())
        .init(&device);

    let summary = evaluate(
        &model,
        &loader,
        &device,
        dir.path().join("vgg.csv"),
        None,
        EvalOptions {
            threshold: 0.3,
            ..EvalOptions::default()
        },
    )
    .unwrap();

    assert_eq!(summary.report.n_samples, N_SAMPLES);
    assert!((summary.report.threshold.threshold - 0.3).abs() < 1e-12);
}

#[test]
fn test_shuffled_loader_scores_like_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let sequential = loader(&manifest);
    let dataset = ImageDataset::open(&manifest, Preprocess::isic().with_sizes(40, 32)).unwrap();
    let shuffled = ImageLoader::builder(dataset)
        .batch_size(4)
        .shuffle(true)
        .seed(Seed::new(3))
        .build()
        .unwrap();

    let device = Default::default();
    Seed::new(11).seed_backend::<TestBackend>();
    let model: AttnVgg<TestBackend> = attn_config(true).init(&device);

    let options = EvalOptions::default();
    let a = evaluate(&model, &sequential, &device, dir.path().join("seq.csv"), None, options).unwrap();
    let b = evaluate(&model, &shuffled, &device, dir.path().join("shuf.csv"), None, options).unwrap();

    assert_eq!(b.n_samples, N_SAMPLES);
    assert_eq!(a.correct, b.correct);
    assert!((b.accuracy() - b.report.accuracy).abs() < 1e-9);
    assert!((a.report.accuracy - b.report.accuracy).abs() < 1e-9);
    assert!((a.report.auc - b.report.auc).abs() < 1e-6);
    assert!((a.report.mean_average_precision - b.report.mean_average_precision).abs() < 1e-6);
}

#[test]
fn test_in_memory_manifest_evaluates() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    let entries = Manifest::read(&manifest).unwrap().entries().to_vec();
    let dataset = ImageDataset::new(
        Manifest::from_entries(entries),
        Preprocess::isic().with_sizes(40, 32),
    )
    .unwrap();
    let loader = ImageLoader::builder(dataset).batch_size(4).build().unwrap();

    let device = Default::default();
    let model: AttnVgg<TestBackend> = attn_config(true).init(&device);
    let summary = evaluate(
        &model,
        &loader,
        &device,
        dir.path().join("results.csv"),
        None,
        EvalOptions::default(),
    )
    .unwrap();

    assert_eq!(summary.n_samples, N_SAMPLES);
    assert_eq!(summary.report.n_samples, N_SAMPLES);
}

#[test]
fn test_missing_image_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_synthetic_dataset(dir.path());
    fs::remove_file(dir.path().join("ISIC_0000005.png")).unwrap();
    let loader = loader(&manifest);

    let device = Default::default();
    let model: AttnVgg<TestBackend> = attn_config(true).init(&device);
    let result = evaluate(
        &model,
        &loader,
        &device,
        dir.path().join("results.csv"),
        None,
        EvalOptions::default(),
    );
    assert!(result.is_err());
}
