//! Edge-detection post layers. These run over a freshly rendered area (and
//! once more at flush) and synthesize the faces-edges, objects-edges and
//! toon layers from the geometry layers already on the film.
//!
//! Results are written back into the film accumulators pre-multiplied by
//! the pixel weight, so normalization on export returns the intended value.

use crate::color::Rgba;
use crate::layer::{ EdgeParams, LayerKind };
use super::FilmRaster;

/// Sobel gradient magnitude of a scalar field sampled through `value`
fn sobel_at<F: Fn(usize, usize) -> f32>(
    value: &F, x: usize, y: usize, w: usize, h: usize,
) -> f32 {
    let sample = |dx: i64, dy: i64| {
        let xi = (x as i64 + dx).clamp(0, w as i64 - 1) as usize;
        let yi = (y as i64 + dy).clamp(0, h as i64 - 1) as usize;
        value(xi, yi)
    };
    let gx = sample(1, -1) + 2.0 * sample(1, 0) + sample(1, 1)
        - sample(-1, -1) - 2.0 * sample(-1, 0) - sample(-1, 1);
    let gy = sample(-1, 1) + 2.0 * sample(0, 1) + sample(1, 1)
        - sample(-1, -1) - 2.0 * sample(0, -1) - sample(1, -1);
    (gx * gx + gy * gy).sqrt()
}

fn layer_index(raster: &FilmRaster, kind: LayerKind) -> Option<usize> {
    raster.layers.iter().position(|(k, _)| *k == kind)
}

/// Per-pixel edge strength over the region, from the geometric normal and
/// depth discontinuities; dilated by `thickness`.
fn detect_edges(
    raster: &FilmRaster,
    normal_kind: LayerKind,
    x0: usize, x1: usize, y0: usize, y1: usize,
    threshold: f32, thickness: i32,
) -> Vec<f32> {
    let (w, h) = (raster.weights.width(), raster.weights.height());
    let normal = layer_index(raster, normal_kind);
    let depth = layer_index(raster, LayerKind::ZDepthNorm);

    let field = |x: usize, y: usize| -> f32 {
        let weight = raster.weights.get(x, y);
        let mut v = 0.0;
        if let Some(n) = normal {
            let c = raster.layers[n].1.get(x, y).normalized(weight);
            v += c.r + c.g + c.b;
        }
        if let Some(d) = depth {
            v += 4.0 * raster.layers[d].1.get(x, y).normalized(weight).r;
        }
        v
    };

    let rw = x1 - x0;
    let mut edges = vec![0.0f32; rw * (y1 - y0)];
    for y in y0..y1 {
        for x in x0..x1 {
            if sobel_at(&field, x, y, w, h) >= threshold {
                // dilate to the requested edge thickness
                let r = (thickness / 2).max(0) as i64;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let xi = x as i64 + dx;
                        let yi = y as i64 + dy;
                        if xi >= x0 as i64 && (xi as usize) < x1 && yi >= y0 as i64 && (yi as usize) < y1 {
                            edges[(yi as usize - y0) * rw + (xi as usize - x0)] = 1.0;
                        }
                    }
                }
            }
        }
    }
    edges
}

/// Fill the faces-edges layer: boundaries between faces, detected from the
/// smooth shading normal.
pub(super) fn generate_faces_edges(
    raster: &mut FilmRaster,
    x0: usize, x1: usize, y0: usize, y1: usize,
    params: &EdgeParams,
) {
    let Some(target) = layer_index(raster, LayerKind::DebugFacesEdges) else { return };
    let edges = detect_edges(
        raster, LayerKind::NormalSmooth, x0, x1, y0, y1,
        params.face_threshold, params.face_thickness,
    );
    let rw = x1 - x0;
    for y in y0..y1 {
        for x in x0..x1 {
            let weight = raster.weights.get(x, y);
            let e = edges[(y - y0) * rw + (x - x0)];
            raster.layers[target].1.set(x, y, Rgba::new(e, e, e, 1.0) * weight);
        }
    }
}

/// Fill the objects-edges layer and the toon layer. Toon is the combined
/// color quantized and darkened along object silhouettes.
pub(super) fn generate_toon_and_object_edges(
    raster: &mut FilmRaster,
    x0: usize, x1: usize, y0: usize, y1: usize,
    params: &EdgeParams,
) {
    let edges = detect_edges(
        raster, LayerKind::NormalGeom, x0, x1, y0, y1,
        params.threshold, params.thickness,
    );
    let rw = x1 - x0;

    if let Some(target) = layer_index(raster, LayerKind::DebugObjectsEdges) {
        for y in y0..y1 {
            for x in x0..x1 {
                let weight = raster.weights.get(x, y);
                let e = edges[(y - y0) * rw + (x - x0)];
                raster.layers[target].1.set(x, y, Rgba::new(e, e, e, 1.0) * weight);
            }
        }
    }

    let Some(target) = layer_index(raster, LayerKind::Toon) else { return };
    let Some(combined) = layer_index(raster, LayerKind::Combined) else { return };
    let quantum = params.toon_quantization.max(1e-4);
    for y in y0..y1 {
        for x in x0..x1 {
            let weight = raster.weights.get(x, y);
            let base = raster.layers[combined].1.get(x, y).normalized(weight);
            let e = edges[(y - y0) * rw + (x - x0)];
            let quantize = |v: f32| (v / quantum).round() * quantum;
            let toon = Rgba::new(
                crate::space::lerp(e, quantize(base.r), params.toon_color[0]),
                crate::space::lerp(e, quantize(base.g), params.toon_color[1]),
                crate::space::lerp(e, quantize(base.b), params.toon_color[2]),
                base.a,
            );
            raster.layers[target].1.set(x, y, toon * weight);
        }
    }
}
