//! Output size policies.
//!
//! A `Sizer` maps the natural size of a source to the size it should be
//! converted to. Results are fractional; the processor rounds them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

impl Size {
    pub fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    pub fn area(self) -> f64 {
        self.w * self.h
    }

    pub fn aspect(self) -> f64 {
        self.w / self.h
    }

    pub fn scale(self, factor: f64) -> Size {
        Size::new(self.w * factor, self.h * factor)
    }

    /// Both axes rounded to whole pixels
    pub fn rounded(self) -> (i32, i32) {
        (self.w.round() as i32, self.h.round() as i32)
    }
}

/// Maps a natural size to a target size
pub trait Sizer: Send + Sync {
    fn apply(&self, size: Size) -> Size;
}

impl<F> Sizer for F
where
    F: Fn(Size) -> Size + Send + Sync,
{
    fn apply(&self, size: Size) -> Size {
        self(size)
    }
}

pub fn keep_size() -> impl Sizer {
    |size: Size| size
}

/// Limit the width, keeping the aspect ratio
pub fn max_width(max: f64) -> impl Sizer {
    move |size: Size| {
        if size.w <= max {
            size
        } else {
            Size::new(max, max / size.aspect())
        }
    }
}

/// Limit the height, keeping the aspect ratio
pub fn max_height(max: f64) -> impl Sizer {
    move |size: Size| {
        if size.h <= max {
            size
        } else {
            Size::new(max * size.aspect(), max)
        }
    }
}

/// Limit the pixel count, keeping the aspect ratio
pub fn max_area(max: f64) -> impl Sizer {
    move |size: Size| {
        if size.area() <= max {
            size
        } else {
            size.scale((max / size.area()).sqrt())
        }
    }
}

/// Fit inside `max`, keeping the aspect ratio
pub fn max_size(max: Size) -> impl Sizer {
    move |size: Size| {
        if size.w <= max.w && size.h <= max.h {
            return size;
        }
        let fw = max.w / size.w;
        let fh = max.h / size.h;
        size.scale(fw.min(fh))
    }
}
