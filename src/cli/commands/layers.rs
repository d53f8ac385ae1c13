use crate::core::FeatureExtractor;
use crate::extractor::{ModelSpec, ReferenceExtractor};
use anyhow::Result;
use std::path::PathBuf;

/// モデルの特徴ブロブ名と次元数の一覧を作る
pub fn describe_layers(model: Option<&PathBuf>) -> Result<Vec<(String, usize)>> {
    let spec = match model {
        Some(path) => ModelSpec::from_json_file(path)?,
        None => ModelSpec::default(),
    };
    let extractor = ReferenceExtractor::load(&spec)?;

    Ok(extractor
        .layer_names()
        .into_iter()
        .map(|name| {
            let len = extractor.output_len(&name).unwrap_or(0);
            (name, len)
        })
        .collect())
}

pub fn execute_layers(model: Option<PathBuf>) -> Result<i32> {
    let layers = describe_layers(model.as_ref())?;

    println!("📋 特徴ブロブ一覧:");
    for (name, len) in layers {
        println!("   - {name}: {len}");
    }

    Ok(0)
}
