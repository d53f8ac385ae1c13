// SerializedExtractionGate - 非リエントラントな抽出リソースへの排他的な入口

use crate::core::{
    ExecutionMode, FeatureExtractor, FeatureVector, GateError, GateResult, GateStats, SharedImage,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// クリティカルセクション内の抽出数を数えるガード
///
/// ドロップ時にカウンタを戻すため、エラーやパニックで抜けても計数は崩れない。
struct Occupancy<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> Occupancy<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let observed = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(observed, Ordering::SeqCst);
        let guard = Self { in_flight };

        if observed > 1 {
            let violation = GateError::ConcurrencyInvariantViolation { observed };
            log::error!("{violation}");
            panic!("{violation}");
        }

        guard
    }
}

impl Drop for Occupancy<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 抽出リソースへの呼び出しを完全に直列化するゲート
///
/// 抽出器はゲートが所有し、ミューテックスの内側でのみ触れられる。
/// 1回の呼び出しにおける「モード設定→抽出→結果コピー」は分割されずに実行される。
pub struct SerializedExtractionGate<E: FeatureExtractor> {
    handle: Mutex<E>,
    mode: ExecutionMode,
    in_flight: AtomicUsize,
    peak_concurrency: AtomicUsize,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    mode_switches: AtomicU64,
    time_in_gate_us: AtomicU64,
}

impl<E: FeatureExtractor> SerializedExtractionGate<E> {
    /// 抽出器を受け取り、指定モードで使うゲートを作成
    pub fn new(extractor: E, mode: ExecutionMode) -> Self {
        Self {
            handle: Mutex::new(extractor),
            mode,
            in_flight: AtomicUsize::new(0),
            peak_concurrency: AtomicUsize::new(0),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            mode_switches: AtomicU64::new(0),
            time_in_gate_us: AtomicU64::new(0),
        }
    }

    /// 画像から指定レイヤーの特徴ベクトルを抽出
    ///
    /// 同時に呼ばれても抽出本体は1つずつしか実行されない。
    /// 失敗時は部分的なベクトルを返さず `GateError::Extraction` を返す。
    pub fn extract(&self, image: &SharedImage, layer: &str) -> GateResult<FeatureVector> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let mut handle = self.handle.lock();
        let _occupancy = Occupancy::enter(&self.in_flight, &self.peak_concurrency);
        let start_time = Instant::now();

        let result = self.extract_locked(&mut handle, image, layer);

        self.time_in_gate_us
            .fetch_add(start_time.elapsed().as_micros() as u64, Ordering::Relaxed);
        match &result {
            Ok(_) => self.successful_calls.fetch_add(1, Ordering::Relaxed),
            Err(error) => {
                log::debug!("Extraction failed: {error}");
                self.failed_calls.fetch_add(1, Ordering::Relaxed)
            }
        };

        result
    }

    fn extract_locked(
        &self,
        handle: &mut E,
        image: &SharedImage,
        layer: &str,
    ) -> GateResult<FeatureVector> {
        if handle.execution_mode() != Some(self.mode) {
            handle.set_execution_mode(self.mode).map_err(|e| {
                GateError::extraction(
                    image.label(),
                    layer,
                    e.context(format!("Failed to set {} mode", self.mode)),
                )
            })?;
            self.mode_switches.fetch_add(1, Ordering::Relaxed);
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(GateError::extraction(
                image.label(),
                layer,
                anyhow::anyhow!("Image is empty ({width}x{height})"),
            ));
        }

        let values = handle
            .extract(image.image(), layer)
            .map_err(|e| GateError::extraction(image.label(), layer, e))?;

        if values.is_empty() {
            return Err(GateError::extraction(
                image.label(),
                layer,
                anyhow::anyhow!("Extractor returned an empty feature vector"),
            ));
        }

        Ok(FeatureVector::new(layer, values))
    }

    /// ゲートが使用する実行モード
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.handle.lock().layer_names()
    }

    pub fn backend_name(&self) -> &'static str {
        self.handle.lock().backend_name()
    }

    /// 現在の統計情報のスナップショット
    pub fn stats(&self) -> GateStats {
        GateStats {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            mode_switches: self.mode_switches.load(Ordering::Relaxed),
            peak_concurrency: self.peak_concurrency.load(Ordering::SeqCst),
            time_in_gate_ms: self.time_in_gate_us.load(Ordering::Relaxed) / 1000,
        }
    }

    /// ゲートを分解して抽出器を取り出す
    pub fn into_inner(self) -> E {
        self.handle.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MockFeatureExtractor;
    use crate::extractor::{ModelSpec, ReferenceExtractor};
    use image::DynamicImage;
    use mockall::predicate::*;
    use std::sync::Arc;

    fn image(label: &str, width: u32, height: u32) -> SharedImage {
        SharedImage::new(label, 0, DynamicImage::new_rgb8(width, height))
    }

    #[test]
    fn test_extract_sets_mode_once() {
        let mut mock = MockFeatureExtractor::new();
        let mut current = None;
        mock.expect_execution_mode()
            .times(2)
            .returning(move || {
                let mode = current;
                current = Some(ExecutionMode::Gpu);
                mode
            });
        mock.expect_set_execution_mode()
            .with(eq(ExecutionMode::Gpu))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_extract()
            .with(always(), eq("fc7"))
            .times(2)
            .returning(|_, _| Ok(vec![1.0, 2.0, 3.0]));

        let gate = SerializedExtractionGate::new(mock, ExecutionMode::Gpu);
        let input = image("0.bmp", 4, 4);

        let first = gate.extract(&input, "fc7").unwrap();
        let second = gate.extract(&input, "fc7").unwrap();

        assert_eq!(first.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(first, second);
        assert_eq!(gate.stats().mode_switches, 1);
        assert_eq!(gate.stats().successful_calls, 2);
    }

    #[test]
    fn test_extractor_error_is_reported_and_lock_released() {
        let mut mock = MockFeatureExtractor::new();
        mock.expect_execution_mode()
            .return_const(Some(ExecutionMode::Cpu));
        let mut calls = 0;
        mock.expect_extract().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("device lost"))
            } else {
                Ok(vec![0.5])
            }
        });

        let gate = SerializedExtractionGate::new(mock, ExecutionMode::Cpu);
        let input = image("1.bmp", 4, 4);

        let error = gate.extract(&input, "fc7").unwrap_err();
        assert!(matches!(error, GateError::Extraction { .. }));
        assert!(error.to_string().contains("1.bmp"));

        // ロックが解放されているので次の呼び出しは成功する
        assert!(gate.extract(&input, "fc7").is_ok());
        let stats = gate.stats();
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.successful_calls, 1);
        assert_eq!(stats.total_calls, 2);
    }

    #[test]
    fn test_mode_failure_becomes_extraction_error() {
        let mut mock = MockFeatureExtractor::new();
        mock.expect_execution_mode().return_const(None::<ExecutionMode>);
        mock.expect_set_execution_mode()
            .returning(|_| Err(anyhow::anyhow!("no device")));
        mock.expect_extract().never();

        let gate = SerializedExtractionGate::new(mock, ExecutionMode::Gpu);
        let error = gate.extract(&image("a", 2, 2), "fc7").unwrap_err();

        assert!(matches!(error, GateError::Extraction { .. }));
        assert_eq!(gate.stats().mode_switches, 0);
    }

    #[test]
    fn test_empty_image_and_empty_output_are_rejected() {
        let mut mock = MockFeatureExtractor::new();
        mock.expect_execution_mode()
            .return_const(Some(ExecutionMode::Gpu));
        mock.expect_extract().times(1).returning(|_, _| Ok(Vec::new()));

        let gate = SerializedExtractionGate::new(mock, ExecutionMode::Gpu);

        let empty_image = gate.extract(&image("blank", 0, 0), "fc7");
        assert!(matches!(empty_image, Err(GateError::Extraction { .. })));

        let empty_output = gate.extract(&image("ok", 2, 2), "fc7");
        assert!(matches!(empty_output, Err(GateError::Extraction { .. })));
    }

    #[test]
    fn test_gate_matches_direct_call() {
        let input = SharedImage::new(
            "gradient",
            0,
            DynamicImage::ImageRgb8(image::ImageBuffer::from_fn(20, 20, |x, y| {
                image::Rgb([(x * 12) as u8, (y * 12) as u8, 7])
            })),
        );

        let mut direct = ReferenceExtractor::load(&ModelSpec::default()).unwrap();
        direct.set_execution_mode(ExecutionMode::Gpu).unwrap();
        let expected = direct.extract(input.image(), "fc7").unwrap();

        let gate = SerializedExtractionGate::new(
            ReferenceExtractor::load(&ModelSpec::default()).unwrap(),
            ExecutionMode::Gpu,
        );
        let actual = gate.extract(&input, "fc7").unwrap();

        assert!(actual.is_bit_identical(&FeatureVector::new("fc7", expected)));
        assert_eq!(gate.backend_name(), "reference");
    }

    #[test]
    fn test_concurrent_callers_never_overlap() {
        let gate = Arc::new(SerializedExtractionGate::new(
            ReferenceExtractor::load(&ModelSpec::default()).unwrap(),
            ExecutionMode::Cpu,
        ));
        let input = image("shared", 16, 16);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let input = input.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        gate.extract(&input, "pool5").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = gate.stats();
        assert_eq!(stats.total_calls, 200);
        assert_eq!(stats.peak_concurrency, 1);
    }

    #[test]
    #[should_panic(expected = "排他制御違反")]
    fn test_occupancy_detects_overlap() {
        let in_flight = AtomicUsize::new(1);
        let peak = AtomicUsize::new(0);
        let _guard = Occupancy::enter(&in_flight, &peak);
    }

    #[test]
    fn test_occupancy_guard_restores_counter() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        {
            let _guard = Occupancy::enter(&in_flight, &peak);
            assert_eq!(in_flight.load(Ordering::SeqCst), 1);
        }
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_inner_returns_configured_extractor() {
        let gate = SerializedExtractionGate::new(
            ReferenceExtractor::load(&ModelSpec::default()).unwrap(),
            ExecutionMode::Gpu,
        );
        gate.extract(&image("x", 4, 4), "hist").unwrap();

        let extractor = gate.into_inner();
        assert_eq!(extractor.execution_mode(), Some(ExecutionMode::Gpu));
    }
}
