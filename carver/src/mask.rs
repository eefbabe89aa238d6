use image::RgbImage;
use structopt::StructOpt;

use crate::{ImageMask, Vector3};

pub const DEFAULT_MASK_THRESHOLD: f64 = 30.0;

#[derive(Clone, Copy, Debug, StructOpt)]
pub struct MaskParams {
    #[structopt(
        help = "Minimum color distance from background to count as object",
        long,
        default_value = "30.0"
    )]
    pub mask_threshold: f64,
}

impl Default for MaskParams {
    fn default() -> Self {
        MaskParams {
            mask_threshold: DEFAULT_MASK_THRESHOLD,
        }
    }
}

pub fn pixel_as_vector3(image: &RgbImage, x: u32, y: u32) -> Vector3 {
    let p = image.get_pixel(x, y);
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

// The top-left pixel is taken as the background color. An object touching
// that corner yields a garbage mask.
pub fn extract_mask(image: &RgbImage, params: &MaskParams) -> ImageMask {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return ImageMask::from_element(h as usize, w as usize, false);
    }

    let background = pixel_as_vector3(image, 0, 0);
    ImageMask::from_fn(h as usize, w as usize, |i, j| {
        let color = pixel_as_vector3(image, j as u32, i as u32);
        (color - background).norm() > params.mask_threshold
    })
}
