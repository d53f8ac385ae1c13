// WorkloadGenerator - 決定的なテスト入力の構築
//
// 画像プールを一度だけ読み込み、ワーカーごとに1枚の画像を割り当てる。
// 乱数は使わず、同じ設定からは常に同じ割り当てが得られる。

use crate::core::{GateError, GateResult, ImageSource, SharedImage, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod source;

pub use source::{DirectoryImageSource, SyntheticImageSource};

/// ワークロード生成の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// 読み込む異なる画像の枚数（スレッド数とは独立）
    pub distinct_images: usize,
    /// 前半のワーカーの割り当てを既存の割り当てと共有させるか
    pub alias_first_half: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            distinct_images: 10,
            alias_first_half: true,
        }
    }
}

impl WorkloadConfig {
    pub fn with_distinct_images(mut self, distinct_images: usize) -> Self {
        self.distinct_images = distinct_images;
        self
    }

    pub fn with_aliasing(mut self, enable: bool) -> Self {
        self.alias_first_half = enable;
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.distinct_images == 0 {
            return Err(ValidationError::new(
                "distinct_images",
                "値は1以上である必要があります",
            ));
        }
        Ok(())
    }
}

/// 1ワーカー分の入力割り当て
#[derive(Debug, Clone)]
pub struct Assignment {
    worker_id: usize,
    image: SharedImage,
    faults: BTreeMap<usize, SharedImage>,
}

impl Assignment {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// ループ全体で使う画像
    pub fn image(&self) -> &SharedImage {
        &self.image
    }

    /// 指定した反復で使う画像（故障注入があればそちらを優先）
    pub fn image_for(&self, iteration: usize) -> &SharedImage {
        self.faults.get(&iteration).unwrap_or(&self.image)
    }
}

/// 生成済みのワークロード
#[derive(Debug, Clone)]
pub struct Workload {
    pool: Vec<SharedImage>,
    assignments: Vec<Assignment>,
}

impl Workload {
    pub fn pool(&self) -> &[SharedImage] {
        &self.pool
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn threads(&self) -> usize {
        self.assignments.len()
    }

    pub fn assignment(&self, worker_id: usize) -> Option<&Assignment> {
        self.assignments.get(worker_id)
    }

    /// 指定ワーカーの指定反復で使う画像を差し替える
    pub fn inject_fault(
        &mut self,
        worker_id: usize,
        iteration: usize,
        image: SharedImage,
    ) -> GateResult<()> {
        let threads = self.assignments.len();
        let assignment = self.assignments.get_mut(worker_id).ok_or_else(|| {
            GateError::validation(
                "worker_id",
                format!("ワーカー{worker_id}は存在しません (スレッド数: {threads})"),
            )
        })?;
        assignment.faults.insert(iteration, image);
        Ok(())
    }

    /// 同一のピクセルバッファを共有しているワーカーの組
    pub fn aliased_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.assignments.iter().enumerate() {
            for b in &self.assignments[i + 1..] {
                if a.image.shares_pixels_with(&b.image) {
                    pairs.push((a.worker_id, b.worker_id));
                }
            }
        }
        pairs
    }
}

/// テスト入力の生成器
#[derive(Debug, Clone, Default)]
pub struct WorkloadGenerator {
    config: WorkloadConfig,
}

impl WorkloadGenerator {
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// 画像プールを読み込み、`threads`個のワーカーに割り当てる
    pub fn generate(&self, source: &dyn ImageSource, threads: usize) -> GateResult<Workload> {
        self.config.validate()?;
        if threads == 0 {
            return Err(GateError::validation(
                "threads",
                "値は1以上である必要があります",
            ));
        }

        log::info!(
            "Loading {} source images from {}",
            self.config.distinct_images,
            source.describe()
        );
        let pool = (0..self.config.distinct_images)
            .map(|index| {
                source
                    .load(index)
                    .map_err(|e| GateError::resource_unavailable(source.describe(), e))
            })
            .collect::<GateResult<Vec<_>>>()?;

        let mut images: Vec<SharedImage> = (0..threads)
            .map(|worker_id| pool[worker_id % pool.len()].clone())
            .collect();

        if self.config.alias_first_half {
            for worker_id in 0..threads / 2 {
                images[worker_id] = images[worker_id * 2].clone();
            }
        }

        let assignments = images
            .into_iter()
            .enumerate()
            .map(|(worker_id, image)| {
                log::debug!("Worker {worker_id} assigned {}", image.label());
                Assignment {
                    worker_id,
                    image,
                    faults: BTreeMap::new(),
                }
            })
            .collect();

        Ok(Workload { pool, assignments })
    }
}
