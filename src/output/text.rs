// 特徴ベクトルのテキスト形式（書き出しと読み込み）
// 1行1画像: `<label>:<v1>;<v2>;...;`

use crate::core::{FeatureVector, GateError, GateResult};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// レイヤーごとの出力ファイルパスを組み立てる（`<stem>_<layer>.txt`）
pub fn layer_output_path(base: &Path, layer: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "features".to_string());
    let file_name = format!("{stem}_{}.txt", layer.replace('/', "_"));

    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

/// 1行分の文字列を組み立てる
pub fn format_line(label: &str, vector: &FeatureVector) -> String {
    let mut line = String::with_capacity(label.len() + vector.len() * 8);
    line.push_str(label);
    line.push(':');
    for value in vector.values() {
        line.push_str(&value.to_string());
        line.push(';');
    }
    line
}

/// 1行を (ラベル, 値) に分解する
///
/// ラベルにはWindowsパスの `C:` のようにコロンが含まれうるため、最後のコロンで区切る。
pub fn parse_line(line: &str) -> Result<(String, Vec<f32>)> {
    let (label, values) = line
        .rsplit_once(':')
        .with_context(|| format!("Missing ':' separator in line: {line}"))?;

    let values = values
        .split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<f32>()
                .with_context(|| format!("Invalid feature value '{value}' for {label}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((label.to_string(), values))
}

/// `extract` が書き出した特徴ファイルを読み込む（空行は無視）
pub fn read_feature_file(path: &Path) -> Result<Vec<(String, Vec<f32>)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feature file: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_line(line)
                .with_context(|| format!("{}: line {}", path.display(), index + 1))
        })
        .collect()
}

/// チャンネルごとの窓から最大値を1つずつ取り出す
///
/// 最大値の初期値は0のため、全要素が負の窓は0になる。
pub fn kernel_max_pool(values: &[f32], window: usize) -> Vec<f32> {
    values
        .chunks(window.max(1))
        .map(|chunk| chunk.iter().copied().fold(0.0f32, f32::max))
        .collect()
}

pub struct FeatureTextWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl FeatureTextWriter {
    pub fn create(path: impl Into<PathBuf>) -> GateResult<Self> {
        let path = path.into();
        let file = File::create(&path)
            .map_err(|e| GateError::output(path.display().to_string(), e.into()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_vector(&mut self, label: &str, vector: &FeatureVector) -> GateResult<()> {
        writeln!(self.writer, "{}", format_line(label, vector))
            .map_err(|e| GateError::output(self.path.display().to_string(), e.into()))?;
        self.lines += 1;
        Ok(())
    }

    pub fn finish(mut self) -> GateResult<usize> {
        self.writer
            .flush()
            .map_err(|e| GateError::output(self.path.display().to_string(), e.into()))?;
        Ok(self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let vector = FeatureVector::new("fc7", vec![0.5, -1.0, 2.0]);
        assert_eq!(format_line("a.png", &vector), "a.png:0.5;-1;2;");
    }

    #[test]
    fn test_parse_line() {
        let (label, values) = parse_line(r"C:\images\0.bmp:0.5;-1;2;").unwrap();
        assert_eq!(label, r"C:\images\0.bmp");
        assert_eq!(values, vec![0.5, -1.0, 2.0]);

        assert!(parse_line("no separator").is_err());
        assert!(parse_line("a.png:1;x;").is_err());
    }

    #[test]
    fn test_read_feature_file_reads_writer_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("features_fc7.txt");

        let mut writer = FeatureTextWriter::create(&path).unwrap();
        writer
            .write_vector("a.png", &FeatureVector::new("fc7", vec![0.25, 3.0]))
            .unwrap();
        writer
            .write_vector("b.png", &FeatureVector::new("fc7", vec![-1.5, 0.0]))
            .unwrap();
        writer.finish().unwrap();

        let features = read_feature_file(&path).unwrap();
        assert_eq!(
            features,
            vec![
                ("a.png".to_string(), vec![0.25, 3.0]),
                ("b.png".to_string(), vec![-1.5, 0.0]),
            ]
        );
        assert!(read_feature_file(&temp_dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_kernel_max_pool() {
        let values = [1.0, 4.0, 2.0, -1.0, -3.0, -2.0];
        assert_eq!(kernel_max_pool(&values, 3), vec![4.0, 0.0]);
        assert_eq!(kernel_max_pool(&values, 1), vec![1.0, 4.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(kernel_max_pool(&values, 6), vec![4.0]);
    }

    #[test]
    fn test_layer_output_path() {
        assert_eq!(
            layer_output_path(Path::new("out/features.txt"), "fc7"),
            PathBuf::from("out/features_fc7.txt")
        );
        assert_eq!(
            layer_output_path(Path::new("features"), "conv/1"),
            PathBuf::from("features_conv_1.txt")
        );
    }

    #[test]
    fn test_writer_writes_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("features_fc7.txt");

        let mut writer = FeatureTextWriter::create(&path).unwrap();
        writer
            .write_vector("one.png", &FeatureVector::new("fc7", vec![1.0]))
            .unwrap();
        writer
            .write_vector("two.png", &FeatureVector::new("fc7", vec![2.0, 3.0]))
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "one.png:1;\ntwo.png:2;3;\n");
    }

    #[test]
    fn test_writer_reports_output_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("out.txt");

        let result = FeatureTextWriter::create(&path);
        assert!(matches!(result, Err(GateError::Output { .. })));
    }
}
