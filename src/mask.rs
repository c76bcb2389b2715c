use crate::error::ConvertError;
use crate::im::MaskIm;
use tracing::debug;

/// Immutable RGBA8 input buffer, row-major.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub w: usize,
    pub h: usize,
    pub rgba: Vec<u8>,
}

impl RasterImage {
    pub fn new(w: usize, h: usize, rgba: Vec<u8>) -> Self {
        Self { w, h, rgba }
    }

    /// Shape check shared by every pipeline entry point.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.w < 2 || self.h < 2 {
            return Err(ConvertError::InputValidation {
                reason: format!("image must be at least 2x2, got {}x{}", self.w, self.h),
            });
        }
        let need = self.w * self.h * 4;
        if self.rgba.len() < need {
            return Err(ConvertError::InputValidation {
                reason: format!(
                    "RGBA buffer holds {} bytes, need {} for {}x{}",
                    self.rgba.len(),
                    need,
                    self.w,
                    self.h
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaskParams {
    /// Luma cut point, 0-255.
    pub threshold: u8,
    /// When set, keep pixels brighter than the threshold instead of darker.
    pub invert: bool,
    /// Pixels with alpha below this are always "off".
    pub alpha_cutoff: u8,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            threshold: 140,
            invert: false,
            alpha_cutoff: 16,
        }
    }
}

/// Threshold the raster into a binary "track" mask.
///
/// Luma is the Rec. 601 weighting 0.299R + 0.587G + 0.114B. A pixel is "on"
/// iff its alpha clears the cutoff and its luma is on the configured side of
/// the threshold. Same image + same params always yields a bit-identical
/// mask.
pub fn extract_mask(img: &RasterImage, params: &MaskParams) -> Result<MaskIm, ConvertError> {
    img.validate()?;

    let mut mask = MaskIm::new(img.w, img.h);
    let threshold = params.threshold as f64;

    for y in 0..img.h {
        for x in 0..img.w {
            let i = (y * img.w + x) * 4;
            let a = img.rgba[i + 3];
            if a < params.alpha_cutoff {
                continue;
            }

            let luma = 0.299 * img.rgba[i] as f64
                + 0.587 * img.rgba[i + 1] as f64
                + 0.114 * img.rgba[i + 2] as f64;

            let on = if params.invert {
                luma > threshold
            } else {
                luma < threshold
            };
            if on {
                mask.set(x, y, 255);
            }
        }
    }

    debug!(
        on = mask.count_on(),
        total = img.w * img.h,
        threshold = params.threshold,
        invert = params.invert,
        "mask extracted"
    );
    Ok(mask)
}
