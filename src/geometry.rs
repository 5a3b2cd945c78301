//! Integer geometry shared by the capture and conversion layers.

use std::fmt;

/// A width/height pair in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Exact pixel area. Computed in `u64` so large sensor sizes cannot overflow.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The same size with width and height swapped.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Half-open pixel rectangle `[left, right) x [top, bottom)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin covering `size`.
    pub const fn of_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Every edge integer-divided by two. Chroma planes of a 4:2:0 frame use
    /// the luma crop halved this way.
    pub fn halved(&self) -> Self {
        Self::new(self.left / 2, self.top / 2, self.right / 2, self.bottom / 2)
    }

    /// True when the rectangle lies inside a buffer of `size`.
    pub fn fits_within(&self, size: Size) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= size.width
            && self.bottom <= size.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_uses_integer_math() {
        let huge = Size::new(u32::MAX, 2);
        assert_eq!(huge.area(), u32::MAX as u64 * 2);
    }

    #[test]
    fn halved_rect_rounds_down() {
        let crop = Rect::new(1, 3, 641, 481);
        assert_eq!(crop.halved(), Rect::new(0, 1, 320, 240));
        assert_eq!(crop.halved().width(), 320);
    }

    #[test]
    fn rect_bounds_check() {
        let size = Size::new(640, 480);
        assert!(Rect::of_size(size).fits_within(size));
        assert!(!Rect::new(0, 0, 641, 480).fits_within(size));
        assert!(!Rect::new(10, 0, 5, 480).fits_within(size));
    }
}
