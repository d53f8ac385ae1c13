// アノテーションCSVの読み込み
// 形式: <画像ID>;<クラスID>;<クエリか(0/1)>;<クラス内画像数>[;以降の列は無視]
// 画像ID列は読み飛ばし、空行を除いた行番号をIDとして使う。

use anyhow::{bail, Context, Result};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// 1画像分のアノテーション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAnnotation {
    pub id: usize,
    pub class_id: i64,
    pub is_query: bool,
    /// 同じクラスに属する画像の総数（自分自身を含む）
    pub class_count: usize,
}

pub fn read_annotations(path: &Path) -> Result<Vec<ImageAnnotation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Error opening annotation file: {}", path.display()))?;
    let annotations = parse_annotations(&content)
        .with_context(|| format!("Invalid annotation file: {}", path.display()))?;

    log::info!(
        "Loaded {} annotations ({} queries) from {}",
        annotations.len(),
        annotations.iter().filter(|a| a.is_query).count(),
        path.display()
    );
    Ok(annotations)
}

pub fn parse_annotations(content: &str) -> Result<Vec<ImageAnnotation>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .enumerate()
        .map(|(id, (index, line))| parse_row(id, index + 1, line))
        .collect()
}

fn parse_row(id: usize, line_number: usize, line: &str) -> Result<ImageAnnotation> {
    let mut columns = line.split(';').map(str::trim).skip(1);

    let class_id = parse_column(columns.next(), "class_id", line_number)?;
    let is_query: u8 = parse_column(columns.next(), "is_query", line_number)?;
    if is_query > 1 {
        bail!(
            "Invalid value in column \"is_query\" on line {line_number}: 0 or 1 expected but {is_query} received"
        );
    }
    let class_count = parse_column(columns.next(), "class_count", line_number)?;

    Ok(ImageAnnotation {
        id,
        class_id,
        is_query: is_query == 1,
        class_count,
    })
}

fn parse_column<T>(column: Option<&str>, name: &str, line_number: usize) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let column =
        column.with_context(|| format!("Missing column \"{name}\" on line {line_number}"))?;
    column.parse::<T>().map_err(|e| {
        anyhow::anyhow!("Error parsing column \"{name}\" on line {line_number}: {e}")
    })
}
