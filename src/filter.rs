//! Image reconstruction filters, precomputed into a lookup table so the
//! film's sample splatting never evaluates a kernel directly.

/// Resolution of the precomputed table along each axis
pub const FILTER_TABLE_SIZE: usize = 16;

/// Upper limit on the filter footprint in pixels
pub const MAX_FILTER_SIZE: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterKind {
    Box,
    Gauss,
    Mitchell,
    Lanczos,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<FilterKind> {
        match name {
            "box" => Some(FilterKind::Box),
            "gauss" => Some(FilterKind::Gauss),
            "mitchell" => Some(FilterKind::Mitchell),
            "lanczos" => Some(FilterKind::Lanczos),
            _ => None,
        }
    }
}

fn box_filter(_dx: f32, _dy: f32) -> f32 {
    1.0
}

fn gauss(dx: f32, dy: f32) -> f32 {
    const GAUSS_EXP: f32 = 0.00247875;
    let r2 = dx * dx + dy * dy;
    ((-6.0 * r2).exp() - GAUSS_EXP).max(0.0)
}

// Lanczos sinc window, size 2
fn lanczos2(dx: f32, dy: f32) -> f32 {
    let x = (dx * dx + dy * dy).sqrt();
    if x == 0.0 { return 1.0 }
    if -2.0 < x && x < 2.0 {
        let a = std::f32::consts::PI * x;
        let b = std::f32::consts::FRAC_PI_2 * x;
        return (a.sin() * b.sin()) / (a * b);
    }
    0.0
}

// Mitchell-Netravali with B = C = 1/3 as suggested by the authors
fn mitchell(dx: f32, dy: f32) -> f32 {
    let x = 2.0 * (dx * dx + dy * dy).sqrt();
    if x >= 2.0 { return 0.0 }
    if x >= 1.0 {
        return x * (x * (x * -0.388_888_89 + 2.0) - 3.333_333_3) + 1.777_777_8;
    }
    x * x * (1.166_666_6 * x - 2.0) + 0.888_888_9
}

/// Separable 2-D weight table for one reconstruction filter. Built once per
/// film and shared read-only across all worker threads; callers only ever
/// see weights, never the kernel itself.
#[derive(Debug, Clone)]
pub struct FilterTable {
    table: Vec<f32>,
    half_width: f64,
    table_scale: f64,
}

impl FilterTable {
    /// Build the table for the given filter and width in pixels. The
    /// effective half-width covers at least one pixel and at most
    /// `MAX_FILTER_SIZE / 2`.
    pub fn new(kind: FilterKind, width: f64) -> FilterTable {
        let mut half_width = 0.5 * width;
        let kernel: fn(f32, f32) -> f32 = match kind {
            FilterKind::Mitchell => { half_width *= 2.6; mitchell },
            FilterKind::Gauss => { half_width *= 2.0; gauss },
            FilterKind::Lanczos => lanczos2,
            FilterKind::Box => box_filter,
        };
        let half_width = half_width.clamp(0.501, 0.5 * MAX_FILTER_SIZE as f64);

        let scale = 1.0 / FILTER_TABLE_SIZE as f32;
        let mut table = Vec::with_capacity(FILTER_TABLE_SIZE * FILTER_TABLE_SIZE);
        for y in 0..FILTER_TABLE_SIZE {
            for x in 0..FILTER_TABLE_SIZE {
                table.push(kernel((x as f32 + 0.5) * scale, (y as f32 + 0.5) * scale));
            }
        }

        FilterTable {
            table,
            half_width,
            table_scale: 0.9999 * FILTER_TABLE_SIZE as f64 / half_width,
        }
    }

    /// Half-extent of the filter footprint in pixels
    #[inline]
    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    /// Index into the table along one axis for a pixel-space offset
    #[inline]
    pub fn index(&self, offset: f64) -> usize {
        ((offset * self.table_scale).abs() as usize).min(FILTER_TABLE_SIZE - 1)
    }

    #[inline]
    pub fn weight_at(&self, ix: usize, iy: usize) -> f32 {
        self.table[iy * FILTER_TABLE_SIZE + ix]
    }

    /// Nearest-bin weight for a 2-D pixel-space offset
    #[inline]
    pub fn weight(&self, dx: f64, dy: f64) -> f32 {
        self.weight_at(self.index(dx), self.index(dy))
    }
}
