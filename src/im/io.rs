use super::core::Im;
use crate::mask::RasterImage;
use image::ImageResult;
use std::path::Path;

// PNG I/O
// -----------------------------------------------------------------------------

/// Load any image file into the pipeline's RGBA8 input form.
pub fn load_raster<P: AsRef<Path>>(path: P) -> ImageResult<RasterImage> {
    let img = image::open(path)?.into_rgba8();
    let w = img.width() as usize;
    let h = img.height() as usize;
    Ok(RasterImage::new(w, h, img.into_raw()))
}

impl Im<u8, 1> {
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let img = image::GrayImage::from_raw(self.w as u32, self.h as u32, self.arr.clone())
            .ok_or_else(|| {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            })?;

        img.save_with_format(path, image::ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::MaskIm;

    #[test]
    fn mask_png_round_trips_through_disk() {
        let mut mask = MaskIm::new(4, 3);
        mask.set(1, 1, 255);
        mask.set(3, 2, 255);

        let path = std::env::temp_dir().join("img2track_mask_roundtrip.png");
        mask.save_png(&path).unwrap();

        let raster = load_raster(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(raster.w, 4);
        assert_eq!(raster.h, 3);
        // Gray 255 loads as white RGBA.
        assert_eq!(&raster.rgba[(1 * 4 + 1) * 4..(1 * 4 + 1) * 4 + 4], &[255, 255, 255, 255]);
        assert_eq!(&raster.rgba[0..4], &[0, 0, 0, 255]);
    }
}
