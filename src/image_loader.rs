use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 読み込み対象とする拡張子
const IMAGE_EXTENSIONS: &[&str] = &["bmp", "png", "jpg", "jpeg", "gif", "tif", "tiff", "webp"];

pub struct ImageLoader;

impl ImageLoader {
    pub fn load_image(path: &Path) -> Result<DynamicImage> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load image from: {}", path.display()))?;

        Ok(image)
    }

    pub fn is_image_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// ファイルならそれ自身、ディレクトリなら配下の画像ファイルをパス順で列挙
    pub fn discover_images(path: &Path) -> Result<Vec<PathBuf>> {
        if !path.exists() {
            anyhow::bail!("Path not found: {}", path.display());
        }

        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(true) {
            let entry =
                entry.with_context(|| format!("Failed to read directory: {}", path.display()))?;
            if entry.file_type().is_file() && Self::is_image_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        Ok(files)
    }
}
