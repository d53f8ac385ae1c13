use super::{LayerKind, ModelSpec, DATA_BLOB, MAX_BLOB_LEN};
use crate::core::{ExecutionMode, FeatureExtractor, GateError};
use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// コンパイル済みのレイヤー
#[derive(Debug)]
struct Stage {
    name: String,
    op: StageOp,
    output_len: usize,
}

#[derive(Debug)]
enum StageOp {
    AvgPool {
        grid: u32,
    },
    Histogram {
        bins: usize,
    },
    InnerProduct {
        input: String,
        input_len: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
        relu: bool,
    },
}

/// リファレンス特徴抽出器
///
/// モデル記述からレイヤーパイプラインを構築し、全レイヤーのブロブを内部バッファに
/// 保持する。順伝播のたびにバッファを書き換えるため、同時に呼び出してはならない。
/// GPUモードはこの実装ではCPU上でエミュレーションされる。
#[derive(Debug)]
pub struct ReferenceExtractor {
    spec: ModelSpec,
    input_len: usize,
    mode: Option<ExecutionMode>,
    stages: Vec<Stage>,
    blobs: HashMap<String, Vec<f32>>,
}

impl ReferenceExtractor {
    /// モデル記述を検証してレイヤーを構築する
    pub fn load(spec: &ModelSpec) -> Result<Self, GateError> {
        let start_time = Instant::now();
        log::info!("Loading model '{}'...", spec.name);

        let (input_len, stages) = Self::compile(spec)
            .with_context(|| format!("Invalid model description: {}", spec.name))
            .map_err(|e| GateError::resource_unavailable(spec.name.clone(), e))?;

        let mut blobs = HashMap::new();
        blobs.insert(DATA_BLOB.to_string(), vec![0.0; input_len]);
        for stage in &stages {
            blobs.insert(stage.name.clone(), vec![0.0; stage.output_len]);
        }

        log::info!(
            "Model '{}' loaded in {:.3} seconds ({} layers)",
            spec.name,
            start_time.elapsed().as_secs_f64(),
            stages.len()
        );

        Ok(Self {
            spec: spec.clone(),
            input_len,
            mode: None,
            stages,
            blobs,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// レイヤーの出力要素数
    pub fn output_len(&self, layer: &str) -> Option<usize> {
        if layer == DATA_BLOB {
            return Some(self.input_len);
        }
        self.stages
            .iter()
            .find(|stage| stage.name == layer)
            .map(|stage| stage.output_len)
    }

    /// レイヤーを構築し、入力ブロブの要素数と共に返す
    fn compile(spec: &ModelSpec) -> Result<(usize, Vec<Stage>)> {
        if spec.input_width == 0 || spec.input_height == 0 {
            bail!("Input geometry must be non-zero");
        }
        if spec.channels != 1 && spec.channels != 3 {
            bail!("Input layer should have 1 or 3 channels");
        }
        let input_len = spec
            .input_len()
            .filter(|len| *len <= MAX_BLOB_LEN)
            .with_context(|| {
                format!(
                    "Input geometry {}x{}x{} exceeds {MAX_BLOB_LEN} elements",
                    spec.input_width, spec.input_height, spec.channels
                )
            })?;
        if spec.mean.len() != spec.channels {
            bail!("Number of channels of mean doesn't match input layer");
        }
        if spec.layers.is_empty() {
            bail!("Model has no layers");
        }

        let mut sizes: HashMap<&str, usize> = HashMap::new();
        sizes.insert(DATA_BLOB, input_len);
        let mut seen = HashSet::new();
        let mut stages = Vec::with_capacity(spec.layers.len());

        for layer in &spec.layers {
            if layer.name == DATA_BLOB || !seen.insert(layer.name.as_str()) {
                bail!("Duplicate layer name: {}", layer.name);
            }

            let (op, output_len) = match &layer.kind {
                LayerKind::AvgPool { grid } => {
                    if *grid == 0 || *grid > spec.input_width.min(spec.input_height) {
                        bail!("Pooling grid of layer {} is out of range", layer.name);
                    }
                    let len = spec.channels * (*grid as usize) * (*grid as usize);
                    (StageOp::AvgPool { grid: *grid }, len)
                }
                LayerKind::Histogram { bins } => {
                    if *bins == 0 || *bins > MAX_BLOB_LEN {
                        bail!("Histogram layer {} has an invalid bin count {bins}", layer.name);
                    }
                    (StageOp::Histogram { bins: *bins }, *bins)
                }
                LayerKind::InnerProduct {
                    input,
                    outputs,
                    seed,
                    relu,
                } => {
                    let input_len = *sizes
                        .get(input.as_str())
                        .with_context(|| format!("Unknown input blob {input} for {}", layer.name))?;
                    if *outputs == 0 {
                        bail!("Inner product layer {} has no outputs", layer.name);
                    }
                    if input_len
                        .checked_mul(*outputs)
                        .map_or(true, |len| len > MAX_BLOB_LEN)
                    {
                        bail!(
                            "Weights of layer {} exceed {MAX_BLOB_LEN} elements ({input_len} x {outputs})",
                            layer.name
                        );
                    }
                    let (weights, bias) = Self::generate_weights(*seed, input_len, *outputs);
                    let op = StageOp::InnerProduct {
                        input: input.clone(),
                        input_len,
                        weights,
                        bias,
                        relu: *relu,
                    };
                    (op, *outputs)
                }
            };

            sizes.insert(layer.name.as_str(), output_len);
            stages.push(Stage {
                name: layer.name.clone(),
                op,
                output_len,
            });
        }

        Ok((input_len, stages))
    }

    fn generate_weights(seed: u64, input_len: usize, outputs: usize) -> (Vec<f32>, Vec<f32>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (input_len as f32).sqrt();
        let weights = (0..input_len * outputs)
            .map(|_| rng.gen_range(-scale..scale))
            .collect();
        let bias = (0..outputs).map(|_| rng.gen_range(-0.1f32..0.1)).collect();
        (weights, bias)
    }

    /// 画像をネットワーク入力形式（planar, 平均値減算済み）に変換してdataブロブに書き込む
    fn preprocess(&mut self, image: &DynamicImage) -> Result<()> {
        let (width, height) = (self.spec.input_width, self.spec.input_height);
        let plane = width as usize * height as usize;
        let resized = image.resize_exact(width, height, FilterType::Triangle);
        let data = self
            .blobs
            .get_mut(DATA_BLOB)
            .context("Input blob is not allocated")?;

        if self.spec.channels == 1 {
            let gray = resized.to_luma8();
            for (i, pixel) in gray.pixels().enumerate() {
                data[i] = pixel[0] as f32 - self.spec.mean[0];
            }
        } else {
            let rgb = resized.to_rgb8();
            for (i, pixel) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    data[c * plane + i] = pixel[c] as f32 - self.spec.mean[c];
                }
            }
        }

        Ok(())
    }

    fn forward(&mut self) -> Result<()> {
        let Self {
            spec,
            stages,
            blobs,
            ..
        } = self;

        for stage in stages.iter() {
            let mut output = blobs
                .remove(&stage.name)
                .with_context(|| format!("Blob {} is not allocated", stage.name))?;
            output.iter_mut().for_each(|value| *value = 0.0);

            let computed = match &stage.op {
                StageOp::AvgPool { grid } => blobs
                    .get(DATA_BLOB)
                    .context("Input blob is not allocated")
                    .map(|data| Self::avg_pool(spec, data, *grid, &mut output)),
                StageOp::Histogram { bins } => blobs
                    .get(DATA_BLOB)
                    .context("Input blob is not allocated")
                    .map(|data| Self::histogram(data, *bins, &mut output)),
                StageOp::InnerProduct {
                    input,
                    input_len,
                    weights,
                    bias,
                    relu,
                } => blobs
                    .get(input)
                    .with_context(|| format!("Blob {input} is not allocated"))
                    .map(|data| {
                        Self::inner_product(&data[..*input_len], weights, bias, *relu, &mut output)
                    }),
            };

            // 失敗時もバッファを戻してから返す
            blobs.insert(stage.name.clone(), output);
            computed?;
        }

        Ok(())
    }

    fn avg_pool(spec: &ModelSpec, data: &[f32], grid: u32, output: &mut [f32]) {
        let (width, height) = (spec.input_width as usize, spec.input_height as usize);
        let grid = grid as usize;
        let plane = width * height;

        for c in 0..spec.channels {
            for gy in 0..grid {
                let (y0, y1) = (gy * height / grid, (gy + 1) * height / grid);
                for gx in 0..grid {
                    let (x0, x1) = (gx * width / grid, (gx + 1) * width / grid);
                    let mut sum = 0.0f32;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            sum += data[c * plane + y * width + x];
                        }
                    }
                    let count = ((y1 - y0) * (x1 - x0)).max(1) as f32;
                    output[c * grid * grid + gy * grid + gx] = sum / count;
                }
            }
        }
    }

    fn histogram(data: &[f32], bins: usize, output: &mut [f32]) {
        for value in data {
            let normalized = ((value + 255.0) / 510.0).clamp(0.0, 1.0);
            let bin = ((normalized * bins as f32) as usize).min(bins - 1);
            output[bin] += 1.0;
        }
        let total = data.len().max(1) as f32;
        output.iter_mut().for_each(|count| *count /= total);
    }

    fn inner_product(input: &[f32], weights: &[f32], bias: &[f32], relu: bool, output: &mut [f32]) {
        for (o, out) in output.iter_mut().enumerate() {
            let row = &weights[o * input.len()..(o + 1) * input.len()];
            let sum: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + bias[o];
            *out = if relu { sum.max(0.0) } else { sum };
        }
    }
}

impl FeatureExtractor for ReferenceExtractor {
    fn set_execution_mode(&mut self, mode: ExecutionMode) -> Result<()> {
        if self.mode != Some(mode) {
            log::debug!("Switching '{}' to {mode} mode", self.spec.name);
            self.mode = Some(mode);
        }
        Ok(())
    }

    fn execution_mode(&self) -> Option<ExecutionMode> {
        self.mode
    }

    fn extract(&mut self, image: &DynamicImage, layer: &str) -> Result<Vec<f32>> {
        if self.mode.is_none() {
            bail!("Execution mode is not set");
        }
        if image.width() == 0 || image.height() == 0 {
            bail!("Unable to decode image: image is empty");
        }
        if self.output_len(layer).is_none() {
            bail!("Unknown feature blob name: {layer}");
        }

        self.preprocess(image)?;
        self.forward()?;

        self.blobs
            .get(layer)
            .cloned()
            .with_context(|| format!("Blob {layer} is not allocated"))
    }

    fn layer_names(&self) -> Vec<String> {
        std::iter::once(DATA_BLOB.to_string())
            .chain(self.stages.iter().map(|stage| stage.name.clone()))
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "reference"
    }
}
