use crate::evaluation::{read_annotations, MapEvaluator};
use crate::output::{read_feature_file, write_report, DistanceFunction};
use anyhow::Result;
use std::path::PathBuf;

/// evaluate コマンドの引数をまとめた構造体
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub features: PathBuf,
    pub annotations: PathBuf,
    pub distance: DistanceFunction,
    pub top_k: usize,
    pub exclude_query: bool,
    pub report: Option<PathBuf>,
}

/// 特徴ファイルとアノテーションから mAP を計算して表示する
pub fn execute_evaluate(options: EvaluateOptions) -> Result<i32> {
    let features = read_feature_file(&options.features)?;
    let annotations = read_annotations(&options.annotations)?;

    println!("📐 mAP評価");
    println!(
        "   - 特徴: {} ({}件)",
        options.features.display(),
        features.len()
    );
    println!("   - アノテーション: {}", options.annotations.display());
    println!("   - 距離関数: {}", options.distance);
    if options.top_k > 0 {
        println!("   - 上位K件: {}", options.top_k);
    }
    if options.exclude_query {
        println!("   - クエリ自身を除外");
    }

    let vectors = features.into_iter().map(|(_, values)| values).collect();
    let report = MapEvaluator::new(vectors, annotations)?
        .with_distance(options.distance)
        .with_top_k(options.top_k)
        .with_exclude_query(options.exclude_query)
        .evaluate()?;

    if let Some(path) = &options.report {
        write_report(path, &report)?;
    }

    println!(
        "📊 Mean average precision: {:.6} ({}クエリ)",
        report.mean_average_precision,
        report.queries.len()
    );
    Ok(0)
}
