use crate::color::Rgba;
use crate::error::Error;
use crate::film::Buffer2D;
use crate::layer::LayerKind;

/// External collaborator that encodes normalized pixel data. The core hands
/// over linear-light pixels and an alpha-premultiply hint; everything about
/// formats and color encoding lives behind this boundary.
pub trait ImageOutput: Send {
    /// Deliver one normalized layer. `tag` is the user-facing layer tag used
    /// for file naming, `premultiply` asks for premultiplied alpha.
    fn flush_layer(
        &mut self,
        kind: LayerKind,
        tag: &str,
        pixels: &Buffer2D<Rgba>,
        premultiply: bool,
    ) -> Result<(), Error>;

    /// True if this output can pack every layer into a single file
    fn supports_multi_layer(&self) -> bool {
        false
    }
}

/// Collects flushed layers in memory. Used by tests and by callers that
/// post-process pixels themselves instead of writing files.
#[derive(Default)]
pub struct MemoryOutput {
    layers: Vec<(LayerKind, Buffer2D<Rgba>)>,
}

impl MemoryOutput {
    pub fn new() -> MemoryOutput {
        MemoryOutput::default()
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&Buffer2D<Rgba>> {
        self.layers.iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, pixels)| pixels)
    }
}

impl ImageOutput for MemoryOutput {
    fn flush_layer(
        &mut self,
        kind: LayerKind,
        _tag: &str,
        pixels: &Buffer2D<Rgba>,
        _premultiply: bool,
    ) -> Result<(), Error> {
        if let Some(slot) = self.layers.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = pixels.clone();
        } else {
            self.layers.push((kind, pixels.clone()));
        }
        Ok(())
    }
}

#[cfg(feature = "png")]
pub use self::png::PngOutput;

#[cfg(feature = "png")]
mod png {
    use std::path::{ Path, PathBuf };
    use image::RgbaImage;
    use log::info;
    use super::*;

    /// Writes each flushed layer as an 8-bit sRGB PNG file next to the
    /// configured base path, named `<base> [<tag> - <layer>].png` for
    /// everything but the combined layer.
    pub struct PngOutput {
        base: PathBuf,
    }

    impl PngOutput {
        pub fn new(base: impl AsRef<Path>) -> PngOutput {
            PngOutput { base: base.as_ref().to_path_buf() }
        }

        fn file_name(&self, kind: LayerKind, tag: &str) -> PathBuf {
            if kind == LayerKind::Combined {
                return self.base.with_extension("png");
            }
            let stem = self.base.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "render".to_string());
            self.base.with_file_name(format!("{} [{} - {}].png", stem, tag, kind.name()))
        }
    }

    impl ImageOutput for PngOutput {
        fn flush_layer(
            &mut self,
            kind: LayerKind,
            tag: &str,
            pixels: &Buffer2D<Rgba>,
            premultiply: bool,
        ) -> Result<(), Error> {
            let (w, h) = (pixels.width() as u32, pixels.height() as u32);
            let mut out = RgbaImage::new(w, h);
            for y in 0..h {
                for x in 0..w {
                    let mut c = pixels.get(x as usize, y as usize);
                    if premultiply {
                        c.r *= c.a;
                        c.g *= c.a;
                        c.b *= c.a;
                    }
                    out.put_pixel(x, y, image::Rgba([
                        encode_srgb(c.r),
                        encode_srgb(c.g),
                        encode_srgb(c.b),
                        (c.a.clamp(0.0, 1.0) * 255.0).round() as u8,
                    ]));
                }
            }
            let path = self.file_name(kind, tag);
            out.save(&path).map_err(|e| Error::config(format!("png save failed: {}", e)))?;
            info!("wrote layer '{}' to {}", kind.name(), path.display());
            Ok(())
        }
    }

    /// Linear-light to 8-bit sRGB
    fn encode_srgb(v: f32) -> u8 {
        let v = v.clamp(0.0, 1.0);
        let encoded = if v <= 0.003_130_8 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        };
        (encoded * 255.0).round() as u8
    }
}
