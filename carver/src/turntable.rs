use crate::view::View;
use crate::{Point3, Vector3};

/// Orthographic camera of a turntable shot.
///
/// The object spins about the vertical Y axis by the view angle while the
/// camera stays put looking along +Z. World coordinates in `[-1, 1]` span
/// the whole image. Carving, depth maps and coloring must all go through
/// this type so that they agree on every pixel.
#[derive(Clone, Copy, Debug)]
pub struct Turntable {
    cos: f64,
    sin: f64,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    // Continuous pixel coordinates.
    pub u: f64,
    pub v: f64,
    // Camera-relative depth, smaller is nearer.
    pub depth: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub depth: f64,
}

impl Turntable {
    pub fn new(angle_degrees: f64, width: u32, height: u32) -> Turntable {
        let theta = angle_degrees.to_radians();
        Turntable {
            cos: theta.cos(),
            sin: theta.sin(),
            width,
            height,
        }
    }

    pub fn for_view(view: &View) -> Turntable {
        Turntable::new(view.angle_degrees, view.width(), view.height())
    }

    pub fn project(&self, point: &Point3) -> Projection {
        let xr = self.cos * point.x + self.sin * point.z;
        let zr = -self.sin * point.x + self.cos * point.z;
        let yr = point.y;

        Projection {
            u: (xr + 1.0) / 2.0 * (self.width as f64 - 1.0),
            v: (-yr + 1.0) / 2.0 * (self.height as f64 - 1.0),
            depth: zr,
        }
    }

    /// Returns the pixel the point lands on, or `None` if it falls outside
    /// the image or the projection is not finite.
    pub fn pixel(&self, point: &Point3) -> Option<Pixel> {
        let Projection { u, v, depth } = self.project(point);
        if !u.is_finite() || !v.is_finite() {
            return None;
        }

        let (x, y) = (u.round(), v.round());
        if x < 0.0
            || x >= self.width as f64
            || y < 0.0
            || y >= self.height as f64
        {
            return None;
        }

        Some(Pixel {
            x: x as u32,
            y: y as u32,
            depth,
        })
    }

    // (sin θ, 0, cos θ), the direction facing is measured against.
    pub fn view_direction(&self) -> Vector3 {
        Vector3::new(self.sin, 0.0, self.cos)
    }
}
