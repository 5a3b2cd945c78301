//! Display-side geometry: preview transform and aspect-ratio fitting.

use anyhow::{anyhow, Result};

use crate::geometry::Size;

/// Display rotation in quarter turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl Rotation {
    /// Quarter-turn index, 0..=3.
    pub fn quantum(&self) -> i32 {
        match self {
            Rotation::Rotation0 => 0,
            Rotation::Rotation90 => 1,
            Rotation::Rotation180 => 2,
            Rotation::Rotation270 => 3,
        }
    }

    pub fn from_quantum(quantum: i32) -> Self {
        match quantum.rem_euclid(4) {
            1 => Rotation::Rotation90,
            2 => Rotation::Rotation180,
            3 => Rotation::Rotation270,
            _ => Rotation::Rotation0,
        }
    }

    /// Parse a rotation given in degrees. Only multiples of 90 are accepted.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(anyhow!("rotation must be a multiple of 90, got {}", degrees));
        }
        Ok(Self::from_quantum(degrees / 90))
    }

    pub fn degrees(&self) -> i32 {
        self.quantum() * 90
    }

    pub fn is_quarter(&self) -> bool {
        matches!(self, Rotation::Rotation90 | Rotation::Rotation270)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Floating-point rectangle used for transform math.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    pub fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

/// 2D affine transform `(x, y) -> (sx*x + kx*y + tx, ky*x + sy*y + ty)`.
///
/// `post_*` operations apply after the current transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineMatrix {
    pub sx: f32,
    pub kx: f32,
    pub tx: f32,
    pub ky: f32,
    pub sy: f32,
    pub ty: f32,
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

const EPSILON: f32 = 1e-4;

impl AffineMatrix {
    pub const fn identity() -> Self {
        Self {
            sx: 1.0,
            kx: 0.0,
            tx: 0.0,
            ky: 0.0,
            sy: 1.0,
            ty: 0.0,
        }
    }

    fn translate(dx: f32, dy: f32) -> Self {
        Self {
            tx: dx,
            ty: dy,
            ..Self::identity()
        }
    }

    /// `self` applied after `other`.
    fn compose(&self, other: &AffineMatrix) -> AffineMatrix {
        AffineMatrix {
            sx: self.sx * other.sx + self.kx * other.ky,
            kx: self.sx * other.kx + self.kx * other.sy,
            tx: self.sx * other.tx + self.kx * other.ty + self.tx,
            ky: self.ky * other.sx + self.sy * other.ky,
            sy: self.ky * other.kx + self.sy * other.sy,
            ty: self.ky * other.tx + self.sy * other.ty + self.ty,
        }
    }

    fn about_pivot(op: AffineMatrix, px: f32, py: f32) -> AffineMatrix {
        Self::translate(px, py)
            .compose(&op)
            .compose(&Self::translate(-px, -py))
    }

    /// Replace with the mapping that stretches `src` onto `dst` (fill mode).
    pub fn set_rect_to_rect(&mut self, src: RectF, dst: RectF) {
        if src.width() == 0.0 || src.height() == 0.0 {
            *self = Self::identity();
            return;
        }
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        *self = AffineMatrix {
            sx,
            kx: 0.0,
            tx: dst.left - src.left * sx,
            ky: 0.0,
            sy,
            ty: dst.top - src.top * sy,
        };
    }

    pub fn post_scale(&mut self, sx: f32, sy: f32, px: f32, py: f32) {
        let scale = AffineMatrix {
            sx,
            sy,
            ..Self::identity()
        };
        *self = Self::about_pivot(scale, px, py).compose(self);
    }

    /// Rotate clockwise (y axis pointing down) by `degrees` about `(px, py)`.
    pub fn post_rotate(&mut self, degrees: f32, px: f32, py: f32) {
        let (sin, cos) = sin_cos_degrees(degrees);
        let rotate = AffineMatrix {
            sx: cos,
            kx: -sin,
            tx: 0.0,
            ky: sin,
            sy: cos,
            ty: 0.0,
        };
        *self = Self::about_pivot(rotate, px, py).compose(self);
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.sx * x + self.kx * y + self.tx,
            self.ky * x + self.sy * y + self.ty,
        )
    }

    pub fn approx_eq(&self, other: &AffineMatrix) -> bool {
        [
            (self.sx, other.sx),
            (self.kx, other.kx),
            (self.tx, other.tx),
            (self.ky, other.ky),
            (self.sy, other.sy),
            (self.ty, other.ty),
        ]
        .iter()
        .all(|(a, b)| (a - b).abs() <= EPSILON)
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Self::identity())
    }
}

// Exact values on quarter turns keep rotated transforms free of drift.
fn sin_cos_degrees(degrees: f32) -> (f32, f32) {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        (0.0, 1.0)
    } else if normalized == 90.0 {
        (1.0, 0.0)
    } else if normalized == 180.0 {
        (0.0, -1.0)
    } else if normalized == 270.0 {
        (-1.0, 0.0)
    } else {
        normalized.to_radians().sin_cos()
    }
}

/// Transform that maps sensor-oriented preview buffers onto a view of size
/// `view`, correcting for the display `rotation`.
pub fn compute_transform(view: Size, preview: Size, rotation: Rotation) -> AffineMatrix {
    let mut matrix = AffineMatrix::identity();
    let view_rect = RectF::new(0.0, 0.0, view.width as f32, view.height as f32);
    let mut buffer_rect = RectF::new(0.0, 0.0, preview.height as f32, preview.width as f32);
    let center_x = view_rect.center_x();
    let center_y = view_rect.center_y();

    match rotation {
        Rotation::Rotation90 | Rotation::Rotation270 => {
            buffer_rect.offset(
                center_x - buffer_rect.center_x(),
                center_y - buffer_rect.center_y(),
            );
            matrix.set_rect_to_rect(view_rect, buffer_rect);
            if preview.width > 0 && preview.height > 0 {
                let scale = (view.height as f32 / preview.height as f32)
                    .max(view.width as f32 / preview.width as f32);
                matrix.post_scale(scale, scale, center_x, center_y);
            }
            matrix.post_rotate((90 * (rotation.quantum() - 2)) as f32, center_x, center_y);
        }
        Rotation::Rotation180 => {
            matrix.post_rotate(180.0, center_x, center_y);
        }
        Rotation::Rotation0 => {}
    }
    matrix
}

/// Aspect-ratio constrained measurement for a preview view.
///
/// With no ratio set the offered size is used as-is; otherwise the largest
/// size with the configured ratio that fits the offered space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoFitLayout {
    ratio_width: u32,
    ratio_height: u32,
}

impl AutoFitLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_aspect_ratio(&mut self, width: u32, height: u32) {
        self.ratio_width = width;
        self.ratio_height = height;
    }

    pub fn aspect_ratio(&self) -> Option<Size> {
        if self.ratio_width == 0 || self.ratio_height == 0 {
            None
        } else {
            Some(Size::new(self.ratio_width, self.ratio_height))
        }
    }

    pub fn measure(&self, width: u32, height: u32) -> Size {
        let Some(ratio) = self.aspect_ratio() else {
            return Size::new(width, height);
        };
        let (w, h) = (width as u64, height as u64);
        let (rw, rh) = (ratio.width as u64, ratio.height as u64);
        if w < h * rw / rh {
            Size::new(width, (w * rh / rw) as u32)
        } else {
            Size::new((h * rw / rh) as u32, height)
        }
    }
}

/// Aspect ratio the view should adopt for a preview in the given orientation.
pub fn aspect_for_orientation(preview: Size, orientation: Orientation) -> Size {
    match orientation {
        Orientation::Landscape => preview,
        Orientation::Portrait => preview.transposed(),
    }
}
