//! Image grids and PNG output for `[-1, 1]` tensors

use std::path::Path;

use image::GrayImage;
use tch::{Kind, Tensor};

use crate::error::{Error, Result};

/// Tile a `[N, C, H, W]` batch into one `[C, rows * H, cols * W]` image
///
/// Images fill the grid row by row; empty cells are black.
pub fn immerge(images: &Tensor, n_rows: i64) -> Tensor {
    let size = images.size();
    let (n, c, h, w) = (size[0], size[1], size[2], size[3]);
    let n_rows = n_rows.clamp(1, n.max(1));
    let n_cols = (n + n_rows - 1) / n_rows;

    let canvas = Tensor::full(
        [c, n_rows * h, n_cols * w],
        -1.0,
        (images.kind(), images.device()),
    );

    for idx in 0..n {
        let (row, col) = (idx / n_cols, idx % n_cols);
        let mut cell = canvas.narrow(1, row * h, h).narrow(2, col * w, w);
        cell.copy_(&images.get(idx));
    }

    canvas
}

/// Convert a `[1, H, W]` or `[H, W]` tensor in `[-1, 1]` to an 8-bit image
pub fn to_gray_image(t: &Tensor) -> Result<GrayImage> {
    let t = t.detach().to_device(tch::Device::Cpu);
    let t = match t.size().as_slice() {
        [1, _, _] => t.squeeze_dim(0),
        [_, _] => t,
        other => return Err(Error::ImageTensorShape(other.to_vec())),
    };
    let (h, w) = (t.size()[0], t.size()[1]);

    let pixels = ((t + 1.0) * 127.5).round().clamp(0.0, 255.0).to_kind(Kind::Uint8);
    let data = Vec::<u8>::try_from(pixels.contiguous().flatten(0, -1))?;

    GrayImage::from_raw(w as u32, h as u32, data).ok_or(Error::ImageTensorShape(vec![h, w]))
}

/// Write a `[N, 1, H, W]` batch as a single-row grid PNG, or a single image
pub fn save_image(t: &Tensor, path: impl AsRef<Path>) -> Result<()> {
    let img = if t.dim() == 4 { immerge(t, 1) } else { t.shallow_clone() };
    to_gray_image(&img)?.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_immerge_layout() {
        let images = Tensor::cat(
            &[
                Tensor::full([3, 1, 2, 2], -1.0, (Kind::Float, Device::Cpu)),
                Tensor::full([3, 1, 2, 2], 1.0, (Kind::Float, Device::Cpu)),
            ],
            0,
        );

        let grid = immerge(&images, 2);
        assert_eq!(grid.size(), vec![1, 4, 6]);

        // first row from the first three images, second row from the rest
        assert_eq!(grid.double_value(&[0, 0, 5]), -1.0);
        assert_eq!(grid.double_value(&[0, 3, 0]), 1.0);
    }

    #[test]
    fn test_immerge_single_image() {
        let image = Tensor::rand([1, 1, 4, 5], (Kind::Float, Device::Cpu));
        let grid = immerge(&image, 2);
        assert_eq!(grid.size(), vec![1, 4, 5]);
        assert_eq!(
            (grid - image.get(0)).abs().max().double_value(&[]),
            0.0
        );
    }

    #[test]
    fn test_to_gray_image_range() {
        let t = Tensor::from_slice(&[-1.0f32, 0.0, 1.0, 2.0]).view([1, 2, 2]);
        let img = to_gray_image(&t).unwrap();

        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.as_raw(), &vec![0u8, 128, 255, 255]);
    }

    #[test]
    fn test_rejects_color_tensor() {
        let t = Tensor::zeros([3, 4, 4], (Kind::Float, Device::Cpu));
        assert!(matches!(to_gray_image(&t), Err(Error::ImageTensorShape(_))));
    }

    #[test]
    fn test_save_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grid.png");

        let batch = Tensor::zeros([2, 1, 8, 8], (Kind::Float, Device::Cpu));
        save_image(&batch, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_luma8();
        assert_eq!(loaded.dimensions(), (16, 8));
    }
}
