use crate::core::{ExecutionMode, FeatureVector, SharedImage};
use crate::extractor::{ModelSpec, ReferenceExtractor};
use crate::gate::SerializedExtractionGate;
use crate::image_loader::ImageLoader;
use crate::output::{kernel_max_pool, layer_output_path, FeatureTextWriter};
use anyhow::Result;
use std::path::PathBuf;

/// extract コマンドの引数をまとめた構造体
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layers: Vec<String>,
    pub mode: ExecutionMode,
    pub model: Option<PathBuf>,
    pub log_every_nth: Option<usize>,
    /// チャンネルごとの最大値だけを書き出す
    pub kernel_max_pooling: bool,
}

/// カンマ区切りのレイヤー指定を分解する
pub fn parse_layer_list(layers: &str) -> Vec<String> {
    layers
        .split(',')
        .map(str::trim)
        .filter(|layer| !layer.is_empty())
        .map(str::to_string)
        .collect()
}

/// 画像ごとに特徴ベクトルを抽出してテキストに書き出す
///
/// 読み込みや抽出に失敗した画像はスキップし、1枚でも失敗があれば終了コード1を返す。
pub fn execute_extract(options: ExtractOptions) -> Result<i32> {
    if options.layers.is_empty() {
        anyhow::bail!("At least one layer must be specified");
    }

    let model = match &options.model {
        Some(path) => ModelSpec::from_json_file(path)?,
        None => ModelSpec::default(),
    };
    let gate = SerializedExtractionGate::new(ReferenceExtractor::load(&model)?, options.mode);

    let available = gate.layer_names();
    if let Some(unknown) = options.layers.iter().find(|layer| !available.contains(layer)) {
        anyhow::bail!(
            "Unknown feature blob name: {unknown} (available: {})",
            available.join(", ")
        );
    }

    let images = ImageLoader::discover_images(&options.input)?;
    if images.is_empty() {
        anyhow::bail!("No image files found in: {}", options.input.display());
    }

    // カーネル最大プーリングの窓サイズ（無効なら None）
    let windows = options
        .layers
        .iter()
        .map(|layer| {
            if !options.kernel_max_pooling {
                return Ok(None);
            }
            model
                .spatial_window(layer)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Layer {layer} has no spatial layout"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut writers = options
        .layers
        .iter()
        .map(|layer| FeatureTextWriter::create(layer_output_path(&options.output, layer)))
        .collect::<Result<Vec<_>, _>>()?;

    let log_every_nth = options
        .log_every_nth
        .unwrap_or_else(|| options.mode.default_log_every_nth())
        .max(1);

    println!("🔍 特徴抽出開始");
    println!("   - 入力: {} ({}枚)", options.input.display(), images.len());
    println!("   - レイヤー: {}", options.layers.join(", "));
    println!("   - モード: {}", options.mode);
    if options.kernel_max_pooling {
        println!("   - カーネル最大プーリング: 有効");
    }

    let mut failures = 0;
    for (index, path) in images.iter().enumerate() {
        let label = path.display().to_string();
        let image = match ImageLoader::load_image(path) {
            Ok(image) => SharedImage::new(label.clone(), index, image),
            Err(error) => {
                log::warn!("Skipping {label}: {error:#}");
                failures += 1;
                continue;
            }
        };

        for ((layer, writer), window) in options
            .layers
            .iter()
            .zip(writers.iter_mut())
            .zip(windows.iter())
        {
            match gate.extract(&image, layer) {
                Ok(vector) => {
                    let vector = match window {
                        Some(window) => {
                            FeatureVector::new(layer.as_str(), kernel_max_pool(vector.values(), *window))
                        }
                        None => vector,
                    };
                    writer.write_vector(&label, &vector)?;
                }
                Err(error) => {
                    log::warn!("{error}");
                    failures += 1;
                }
            }
        }

        if (index + 1) % log_every_nth == 0 {
            log::info!("Processed {} / {} images", index + 1, images.len());
        }
    }

    for writer in writers {
        let path = writer.path().to_path_buf();
        let lines = writer.finish()?;
        println!("📄 {} ({lines}行)", path.display());
    }

    let stats = gate.stats();
    println!(
        "✅ 完了: 成功 {}, 失敗 {}, ゲート内時間 {}ms",
        stats.successful_calls, failures, stats.time_in_gate_ms
    );

    Ok(if failures == 0 { 0 } else { 1 })
}
