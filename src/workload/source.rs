// 入力画像の供給元の具象実装

use crate::core::{ImageSource, SharedImage};
use crate::image_loader::ImageLoader;
use anyhow::Result;
use image::{DynamicImage, ImageBuffer, RgbImage};
use std::path::{Path, PathBuf};

/// ディレクトリ内の画像ファイルを供給する実装
///
/// インデックスはファイル数で折り返す（ファイルが10枚ならインデックス12は2枚目）。
/// 画像の元インデックスは折り返し後の値になるため、同じファイルは同じ元画像として扱われる。
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl DirectoryImageSource {
    pub fn new(root: &Path) -> Result<Self> {
        let files = ImageLoader::discover_images(root)?;
        if files.is_empty() {
            anyhow::bail!("No image files found in: {}", root.display());
        }

        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl ImageSource for DirectoryImageSource {
    fn load(&self, index: usize) -> Result<SharedImage> {
        let file_index = index % self.files.len();
        let path = &self.files[file_index];
        let image = ImageLoader::load_image(path)?;
        Ok(SharedImage::new(path.display().to_string(), file_index, image))
    }

    fn describe(&self) -> String {
        format!("{} ({} files)", self.root.display(), self.files.len())
    }
}

/// 決定的に生成した画像を供給する実装（テスト・ベンチマーク用）
#[derive(Debug, Clone)]
pub struct SyntheticImageSource {
    width: u32,
    height: u32,
}

impl Default for SyntheticImageSource {
    fn default() -> Self {
        Self::new(64, 64)
    }
}

impl SyntheticImageSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// インデックスごとに位相と色の異なる縞模様を生成
    fn render(&self, index: usize) -> DynamicImage {
        let phase = (index as u32).wrapping_mul(37);
        let stripe = 4 + (index as u32 % 5) * 3;
        let img: RgbImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let band = ((x + y + phase) / stripe) % 2;
            let r = ((x * 255) / self.width.max(1)) as u8;
            let g = ((y * 255) / self.height.max(1)) as u8;
            let b = if band == 0 {
                (phase % 256) as u8
            } else {
                255 - (phase % 256) as u8
            };
            image::Rgb([r, g, b])
        });
        DynamicImage::ImageRgb8(img)
    }
}

impl ImageSource for SyntheticImageSource {
    fn load(&self, index: usize) -> Result<SharedImage> {
        Ok(SharedImage::new(
            format!("synthetic-{index}"),
            index,
            self.render(index),
        ))
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}
