// 統合テスト用のヘルパーと検査用の抽出器
#![allow(dead_code)]

use anyhow::Result;
use extractor_gate::extractor::{ModelSpec, ReferenceExtractor};
use extractor_gate::workload::{SyntheticImageSource, Workload, WorkloadConfig, WorkloadGenerator};
use extractor_gate::{ExecutionMode, FeatureExtractor, SerializedExtractionGate, SharedImage};
use image::{DynamicImage, GenericImageView};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 同時に抽出本体へ入ったスレッド数を記録する抽出器
///
/// 抽出中はカウンタを上げたまま `hold` だけ待機するため、
/// 直列化されていなければ重なりが観測される。
pub struct ProbeExtractor {
    mode: Option<ExecutionMode>,
    hold: Duration,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl ProbeExtractor {
    pub fn new() -> Self {
        Self::with_hold(Duration::ZERO)
    }

    pub fn with_hold(hold: Duration) -> Self {
        Self {
            mode: None,
            hold,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FeatureExtractor for ProbeExtractor {
    fn set_execution_mode(&mut self, mode: ExecutionMode) -> Result<()> {
        self.mode = Some(mode);
        Ok(())
    }

    fn execution_mode(&self) -> Option<ExecutionMode> {
        self.mode
    }

    fn extract(&mut self, image: &DynamicImage, layer: &str) -> Result<Vec<f32>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }

        // ピクセルのチャンネル和とレイヤー名の長さから決定的なベクトルを作る
        let mut sums = [0f32; 3];
        for (_, _, pixel) in image.pixels() {
            for (sum, value) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += *value as f32;
            }
        }
        let (width, height) = image.dimensions();
        let vector = vec![
            sums[0],
            sums[1],
            sums[2],
            width as f32,
            height as f32,
            layer.len() as f32,
        ];

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(vector)
    }

    fn layer_names(&self) -> Vec<String> {
        vec!["probe".to_string()]
    }

    fn backend_name(&self) -> &'static str {
        "probe"
    }
}

pub fn reference_gate(mode: ExecutionMode) -> Arc<SerializedExtractionGate<ReferenceExtractor>> {
    let extractor = ReferenceExtractor::load(&ModelSpec::default()).expect("reference model");
    Arc::new(SerializedExtractionGate::new(extractor, mode))
}

pub fn synthetic_workload(threads: usize) -> Workload {
    WorkloadGenerator::new(WorkloadConfig::default())
        .generate(&SyntheticImageSource::new(16, 16), threads)
        .expect("synthetic workload")
}

/// 幅・高さ0の画像（抽出は必ず失敗する）
pub fn blank_image() -> SharedImage {
    SharedImage::new("blank", usize::MAX, DynamicImage::new_rgb8(0, 0))
}

/// PNGファイルを書き出す
pub fn write_png(path: &std::path::Path, shade: u8) {
    let image = image::RgbImage::from_fn(20, 20, |x, y| {
        image::Rgb([shade, (x * 12) as u8, (y * 12) as u8])
    });
    image.save(path).expect("write png");
}
