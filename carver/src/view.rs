use std::path::{Path, PathBuf};

use image::io::Reader as ImageReader;
use image::RgbImage;
use log::{debug, info};
use rayon::prelude::*;
use serde::Deserialize;

use crate::mask::{extract_mask, MaskParams};
use crate::{ImageMask, Vector3};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

/// A single turntable shot: the image, the rotation it was taken at and
/// the object silhouette derived from it.
pub struct View {
    pub image: RgbImage,
    pub angle_degrees: f64,
    pub mask: ImageMask,
}

impl View {
    pub fn new(
        image: RgbImage,
        angle_degrees: f64,
        params: &MaskParams,
    ) -> View {
        let mask = extract_mask(&image, params);
        View {
            image,
            angle_degrees,
            mask,
        }
    }

    pub fn with_mask(
        image: RgbImage,
        angle_degrees: f64,
        mask: ImageMask,
    ) -> Result<View> {
        let (w, h) = image.dimensions();
        if mask.nrows() != h as usize || mask.ncols() != w as usize {
            let desc = format!(
                "mask {}x{} does not match image {}x{}",
                mask.ncols(),
                mask.nrows(),
                w,
                h
            );
            return Err(Error::new(InconsistentState, desc));
        }
        Ok(View {
            image,
            angle_degrees,
            mask,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.mask
            .get((y as usize, x as usize))
            .cloned()
            .unwrap_or(false)
    }

    // RGB in [0, 1].
    pub fn color_at(&self, x: u32, y: u32) -> Vector3 {
        let p = self.image.get_pixel(x, y);
        Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) / 255.0
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ViewSource {
    #[serde(rename = "image")]
    pub path: PathBuf,
    #[serde(rename = "angle")]
    pub angle_degrees: f64,
}

pub fn read_view_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<ViewSource>> {
    let path = path.as_ref();
    let json = fs::read_file_to_string(path)?;
    let mut sources: Vec<ViewSource> = serde_json::from_str(&json)
        .into_result(|| {
            format!("failed to parse view manifest '{}'", path.display())
        })?;

    let dir = path.parent().unwrap_or_else(|| ".".as_ref());
    for source in sources.iter_mut() {
        if source.path.is_relative() {
            source.path = dir.join(&source.path);
        }
    }

    Ok(sources)
}

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    let err_fn = || format!("failed to decode image '{}'", path.display());
    let image = ImageReader::new(std::io::BufReader::new(fs::open_file(path)?))
        .with_guessed_format()
        .into_result(err_fn)?
        .decode()
        .map_err(|e| Error::with_source(ImageError, err_fn(), e))?;
    Ok(image.into_rgb8())
}

pub fn load_views(
    sources: &[ViewSource],
    params: &MaskParams,
) -> Result<Vec<View>> {
    if sources.is_empty() {
        return Err(Error::new(
            MalformedData,
            "no views specified".to_string(),
        ));
    }

    info!("loading {} views and extracting masks...", sources.len());
    let views = sources
        .par_iter()
        .map(|source| {
            let image = load_image(&source.path)?;
            let view = View::new(image, source.angle_degrees, params);
            debug!(
                "view '{}' at {}°: {}x{}, {} foreground pixels",
                source.path.display(),
                source.angle_degrees,
                view.width(),
                view.height(),
                view.mask.iter().filter(|&&m| m).count()
            );
            Ok(view)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(views)
}
