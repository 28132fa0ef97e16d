//! Normalized boxes stored as top-left corner plus size.

/// Decimal places kept when a coordinate is shifted between corner and
/// center conventions.
pub const COORD_DECIMALS: i32 = 7;

/// A bounding box `(x, y, width, height)` with `(x, y)` at the top-left,
/// every component a fraction of the frame size.
///
/// Like the server, the box does not enforce positive sizes or in-frame
/// coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    /// Creates a box from its top-left corner and size.
    #[inline]
    pub fn from_corner(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a box from its center and size (the YOLO label convention).
    #[inline]
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::from_corner(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Returns `(cx, cy, width, height)`.
    #[inline]
    pub fn to_cxcywh(&self) -> (f64, f64, f64, f64) {
        let (cx, cy) = self.center();
        (cx, cy, self.width, self.height)
    }

    /// Rounds the origin to [`COORD_DECIMALS`] places and clips it to `[0, 1]`.
    ///
    /// Size is left untouched.
    pub fn clip_origin(&self) -> Self {
        Self::from_corner(
            clip_unit(round_to(self.x, COORD_DECIMALS)),
            clip_unit(round_to(self.y, COORD_DECIMALS)),
            self.width,
            self.height,
        )
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn clip_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
