//! The image film: an accumulating, filtered, multi-layer raster. Samples
//! arrive concurrently and out of order from the tile workers; the film
//! owns the per-pixel weight bookkeeping, the adaptive-sampling dirty mask,
//! the exported snapshot the outputs read, and the resumable on-disk state.

use std::path::PathBuf;
use std::sync::atomic::{ AtomicU64, AtomicUsize, Ordering };
use std::time::Instant;

use log::{ debug, info, warn };
use parking_lot::Mutex;

use crate::color::{ ColorLayers, Rgb, Rgba };
use crate::error::Error;
use crate::filter::{ FilterKind, FilterTable, MAX_FILTER_SIZE };
use crate::layer::{ LayerKind, Layers };
use crate::output::ImageOutput;
use crate::render::control::RenderControl;
use crate::render::monitor::RenderMonitor;

pub mod buffer;
mod edge;
mod format;
pub mod splitter;

pub use self::buffer::{ BitGrid, Buffer2D };
pub use self::splitter::{ ImageSplitter, RenderArea, TileOrder };

/// How the adaptive sampler decides whether a dark pixel still counts as
/// noisy. Darker regions hide noise worse, so their threshold shrinks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DarkDetection {
    None,
    /// Scale the threshold by `(1 - factor) + factor * luminance`
    Linear { factor: f32 },
    /// Follow a fixed piecewise curve over luminance
    Curve,
}

/// Antialiasing and noise-detection configuration shared by the film, the
/// workers and the driver.
#[derive(Debug, Clone)]
pub struct AaNoiseParams {
    pub samples: u32,
    pub passes: u32,
    pub inc_samples: u32,
    pub threshold: f32,
    pub dark_detection: DarkDetection,
    pub detect_color_noise: bool,
    pub variance_edge_size: u32,
    pub variance_pixels: u32,
    pub clamp_samples: f32,
    pub clamp_indirect: f32,
    pub sample_multiplier_factor: f32,
    pub light_sample_multiplier_factor: f32,
    pub indirect_sample_multiplier_factor: f32,
    /// Percentage of total pixels; when fewer get resampled, the threshold
    /// is lowered for the next pass
    pub resampled_floor: f32,
    pub background_resampling: bool,
}

impl Default for AaNoiseParams {
    fn default() -> AaNoiseParams {
        AaNoiseParams {
            samples: 1,
            passes: 1,
            inc_samples: 1,
            threshold: 0.0,
            dark_detection: DarkDetection::None,
            detect_color_noise: false,
            variance_edge_size: 10,
            variance_pixels: 0,
            clamp_samples: 0.0,
            clamp_indirect: 0.0,
            sample_multiplier_factor: 1.0,
            light_sample_multiplier_factor: 1.0,
            indirect_sample_multiplier_factor: 1.0,
            resampled_floor: 0.0,
            background_resampling: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AutoSaveMode {
    None,
    EveryNPasses(u32),
    EveryNSeconds(f64),
}

#[derive(Debug)]
struct AutoSaveState {
    mode: AutoSaveMode,
    pass_counter: u32,
    last_save: Instant,
}

impl AutoSaveState {
    fn new(mode: AutoSaveMode) -> AutoSaveState {
        AutoSaveState { mode, pass_counter: 0, last_save: Instant::now() }
    }

    fn reset(&mut self) {
        self.pass_counter = 0;
        self.last_save = Instant::now();
    }

    /// Called once per pass; true when a pass-interval save is due
    fn pass_due(&mut self) -> bool {
        self.pass_counter += 1;
        match self.mode {
            AutoSaveMode::EveryNPasses(n) => self.pass_counter >= n,
            _ => false,
        }
    }

    /// True when a time-interval save is due
    fn time_due(&self) -> bool {
        match self.mode {
            AutoSaveMode::EveryNSeconds(s) => self.last_save.elapsed().as_secs_f64() > s,
            _ => false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilmLoadSaveMode {
    None,
    Save,
    LoadAndSave,
}

/// Resume-from-disk configuration for the film file
#[derive(Debug, Clone)]
pub struct FilmLoadSave {
    pub mode: FilmLoadSaveMode,
    /// Base path; the node id and `.film` extension are appended
    pub path: PathBuf,
    pub autosave: AutoSaveMode,
}

impl Default for FilmLoadSave {
    fn default() -> FilmLoadSave {
        FilmLoadSave {
            mode: FilmLoadSaveMode::None,
            path: PathBuf::from("render"),
            autosave: AutoSaveMode::None,
        }
    }
}

/// Depth window used to normalize z-depth layers, cached by the driver's
/// depth precalculation
#[derive(Debug, Copy, Clone, Default)]
pub struct DepthRange {
    pub min: f64,
    pub inv_range: f64,
}

/// Construction parameters for [`ImageFilm`]
#[derive(Debug, Clone)]
pub struct FilmParams {
    pub width: i32,
    pub height: i32,
    pub cx0: i32,
    pub cy0: i32,
    pub filter: FilterKind,
    pub filter_width: f64,
    pub tile_size: i32,
    pub tile_order: TileOrder,
    pub thread_count: usize,
    pub layers: Layers,
    pub aa: AaNoiseParams,
    pub images_autosave: AutoSaveMode,
    pub film_load_save: FilmLoadSave,
    pub estimate_density: bool,
    pub computer_node: u32,
}

impl Default for FilmParams {
    fn default() -> FilmParams {
        FilmParams {
            width: 320,
            height: 240,
            cx0: 0,
            cy0: 0,
            filter: FilterKind::Box,
            filter_width: 1.5,
            tile_size: 32,
            tile_order: TileOrder::CentreRandom,
            thread_count: 1,
            layers: Layers::new(),
            aa: AaNoiseParams::default(),
            images_autosave: AutoSaveMode::None,
            film_load_save: FilmLoadSave::default(),
            estimate_density: false,
            computer_node: 0,
        }
    }
}

/// The accumulators proper: one weight raster shared by all layers plus one
/// color raster per layer. A single lock guards them so every deposit is
/// seen atomically across the weight and all layers.
pub(crate) struct FilmRaster {
    pub weights: Buffer2D<f32>,
    pub layers: Vec<(LayerKind, Buffer2D<Rgba>)>,
}

struct DensityRaster {
    image: Buffer2D<Rgb>,
    samples: u64,
}

pub struct ImageFilm {
    width: i32,
    height: i32,
    cx0: i32,
    cx1: i32,
    cy0: i32,
    cy1: i32,

    filter: FilterTable,
    layers: Layers,
    aa: AaNoiseParams,

    raster: Mutex<FilmRaster>,
    density: Mutex<DensityRaster>,
    estimate_density: bool,
    flags: BitGrid,

    splitter: ImageSplitter,
    next_area: AtomicUsize,
    completed_areas: AtomicUsize,

    exported: Mutex<Vec<(LayerKind, Buffer2D<Rgba>)>>,
    outputs: Mutex<Vec<Box<dyn ImageOutput>>>,

    images_autosave: Mutex<AutoSaveState>,
    film_autosave: Mutex<AutoSaveState>,
    film_load_save: FilmLoadSave,

    computer_node: u32,
    base_sampling_offset: u32,
    sampling_offset: u32,

    n_pass: u32,
    n_passes: u32,
    depth_range: DepthRange,

    dropped_samples: AtomicU64,
}

impl ImageFilm {
    pub fn new(params: FilmParams) -> Result<ImageFilm, Error> {
        if params.width <= 0 || params.height <= 0 {
            return Err(Error::config("film dimensions must be positive"));
        }
        if params.tile_size <= 0 {
            return Err(Error::config("tile size must be positive"));
        }
        let (w, h) = (params.width as usize, params.height as usize);
        let layer_images = params.layers.iter()
            .map(|layer| (layer.kind, Buffer2D::new(w, h)))
            .collect::<Vec<_>>();
        let exported = params.layers.exported()
            .map(|layer| (layer.kind, Buffer2D::new(w, h)))
            .collect::<Vec<_>>();
        let splitter = ImageSplitter::new(
            params.width, params.height, params.cx0, params.cy0,
            params.tile_size, params.tile_order, params.thread_count,
        );

        Ok(ImageFilm {
            width: params.width,
            height: params.height,
            cx0: params.cx0,
            cx1: params.cx0 + params.width,
            cy0: params.cy0,
            cy1: params.cy0 + params.height,
            filter: FilterTable::new(params.filter, params.filter_width),
            layers: params.layers,
            aa: params.aa,
            raster: Mutex::new(FilmRaster { weights: Buffer2D::new(w, h), layers: layer_images }),
            density: Mutex::new(DensityRaster { image: Buffer2D::new(w, h), samples: 0 }),
            estimate_density: params.estimate_density,
            flags: BitGrid::new(w, h),
            splitter,
            next_area: AtomicUsize::new(0),
            completed_areas: AtomicUsize::new(0),
            exported: Mutex::new(exported),
            outputs: Mutex::new(Vec::new()),
            images_autosave: Mutex::new(AutoSaveState::new(params.images_autosave)),
            film_autosave: Mutex::new(AutoSaveState::new(params.film_load_save.autosave)),
            film_load_save: params.film_load_save,
            computer_node: params.computer_node,
            base_sampling_offset: 0,
            sampling_offset: 0,
            n_pass: 1,
            n_passes: 1,
            depth_range: DepthRange::default(),
            dropped_samples: AtomicU64::new(0),
        })
    }

    #[inline] pub fn width(&self) -> i32 { self.width }
    #[inline] pub fn height(&self) -> i32 { self.height }
    #[inline] pub fn cx0(&self) -> i32 { self.cx0 }
    #[inline] pub fn cy0(&self) -> i32 { self.cy0 }
    pub fn total_pixels(&self) -> usize { (self.width * self.height) as usize }
    pub fn layers(&self) -> &Layers { &self.layers }
    pub fn aa(&self) -> &AaNoiseParams { &self.aa }
    pub fn filter(&self) -> &FilterTable { &self.filter }
    pub fn load_requested(&self) -> bool { self.film_load_save.mode == FilmLoadSaveMode::LoadAndSave }
    pub fn save_requested(&self) -> bool { self.film_load_save.mode != FilmLoadSaveMode::None }

    pub fn set_aa_threshold(&mut self, threshold: f32) {
        self.aa.threshold = threshold;
    }

    /// Total samples handed out so far; keeps low-discrepancy indices from
    /// repeating across passes and resumed renders
    pub fn sampling_offset(&self) -> u32 { self.sampling_offset }
    pub fn set_sampling_offset(&mut self, offset: u32) { self.sampling_offset = offset; }
    pub fn base_sampling_offset(&self) -> u32 { self.base_sampling_offset }

    pub fn depth_range(&self) -> DepthRange { self.depth_range }
    pub fn set_depth_range(&mut self, range: DepthRange) { self.depth_range = range; }

    /// Count of samples dropped for carrying NaN or infinite values
    pub fn dropped_samples(&self) -> u64 { self.dropped_samples.load(Ordering::Relaxed) }

    pub fn add_output(&mut self, output: Box<dyn ImageOutput>) {
        self.outputs.get_mut().push(output);
    }

    pub fn take_outputs(&mut self) -> Vec<Box<dyn ImageOutput>> {
        std::mem::take(self.outputs.get_mut())
    }

    /// Reset every accumulator for a fresh render of `num_passes` passes
    pub fn init(&mut self, num_passes: u32) {
        let raster = self.raster.get_mut();
        raster.weights.clear();
        for (_, image) in raster.layers.iter_mut() {
            image.clear();
        }
        let density = self.density.get_mut();
        density.image.clear();
        density.samples = 0;
        for (_, image) in self.exported.get_mut().iter_mut() {
            image.clear();
        }
        self.flags.fill(true);
        self.next_area.store(0, Ordering::SeqCst);
        self.completed_areas.store(0, Ordering::SeqCst);
        self.n_pass = 1;
        self.n_passes = num_passes.max(1);
        self.base_sampling_offset = 0;
        self.sampling_offset = 0;
        self.dropped_samples.store(0, Ordering::SeqCst);
        self.images_autosave.get_mut().reset();
        self.film_autosave.get_mut().reset();
    }

    /// Dirty-mask check for adaptive passes; lock-free
    #[inline]
    pub fn should_sample(&self, x: i32, y: i32) -> bool {
        self.aa.threshold <= 0.0 || self.flags.get((x - self.cx0) as usize, (y - self.cy0) as usize)
    }

    /// Atomically dispense the next tile for a worker
    pub fn next_area(&self) -> Option<RenderArea> {
        let n = self.next_area.fetch_add(1, Ordering::Relaxed);
        self.splitter.get(n)
    }

    pub fn area_count(&self) -> usize {
        self.splitter.len()
    }

    /// Normalized sampling-factor layer value at a pixel (canvas-relative
    /// coordinates), if the layer is present
    pub fn sampling_factor_at(&self, x: i32, y: i32) -> Option<f32> {
        if !self.layers.is_defined(LayerKind::DebugSamplingFactor) {
            return None;
        }
        let (px, py) = ((x - self.cx0) as usize, (y - self.cy0) as usize);
        let raster = self.raster.lock();
        let weight = raster.weights.get(px, py);
        let image = raster.layers.iter()
            .find(|(kind, _)| *kind == LayerKind::DebugSamplingFactor)
            .map(|(_, image)| image)?;
        Some(if weight > 0.0 { image.get(px, py).normalized(weight).r } else { 1.0 })
    }

    /// Deposit one sample into every pixel covered by the filter footprint
    /// of `(x + dx, y + dy)`, clipped to the canvas.
    ///
    /// Thread safety matters here even across tiles: the footprint of a
    /// sample near a tile edge reaches into neighbouring tiles, so the
    /// weight and layer rasters update under one lock.
    pub fn add_sample(
        &self, x: i32, y: i32, dx: f64, dy: f64,
        sample: u32, pass: u32, color_layers: &ColorLayers,
    ) {
        if color_layers.has_nan() {
            self.dropped_samples.fetch_add(1, Ordering::Relaxed);
            debug!("dropping non-finite sample {} of pass {} at pixel ({}, {})", sample, pass, x, y);
            return;
        }

        // filter extent, clipped to the canvas
        let filterw = self.filter.half_width();
        let dx0 = (self.cx0 - x).max((dx - filterw).round() as i32);
        let dx1 = (self.cx1 - x - 1).min((dx + filterw - 1.0).round() as i32);
        let dy0 = (self.cy0 - y).max((dy - filterw).round() as i32);
        let dy1 = (self.cy1 - y - 1).min((dy + filterw - 1.0).round() as i32);
        if dx1 < dx0 || dy1 < dy0 {
            return;
        }

        // nearest table bin per covered pixel, per axis
        let mut x_index = [0usize; MAX_FILTER_SIZE + 1];
        let x_offset = dx - 0.5;
        for (n, i) in (dx0..=dx1).enumerate() {
            x_index[n] = self.filter.index(i as f64 - x_offset);
        }
        let mut y_index = [0usize; MAX_FILTER_SIZE + 1];
        let y_offset = dy - 0.5;
        for (n, j) in (dy0..=dy1).enumerate() {
            y_index[n] = self.filter.index(j as f64 - y_offset);
        }

        let (x0, x1) = (x + dx0, x + dx1);
        let (y0, y1) = (y + dy0, y + dy1);
        let clamp = self.aa.clamp_samples;

        let mut raster = self.raster.lock();
        let raster = &mut *raster;
        for j in y0..=y1 {
            for i in x0..=x1 {
                let weight = self.filter.weight_at(
                    x_index[(i - x0) as usize],
                    y_index[(j - y0) as usize],
                );
                let (px, py) = ((i - self.cx0) as usize, (j - self.cy0) as usize);
                *raster.weights.get_mut(px, py) += weight;
                for (kind, image) in raster.layers.iter_mut() {
                    let mut col = color_layers.get(*kind).unwrap_or(Rgba::TRANSPARENT);
                    col.clamp_proportional(clamp);
                    *image.get_mut(px, py) += col * weight;
                }
            }
        }
    }

    /// Splat a light-traced contribution into the density image
    pub fn add_density_sample(&self, color: Rgb, x: i32, y: i32, dx: f64, dy: f64) {
        if !self.estimate_density {
            return;
        }
        let filterw = self.filter.half_width();
        let dx0 = (self.cx0 - x).max((dx - filterw).round() as i32);
        let dx1 = (self.cx1 - x - 1).min((dx + filterw - 1.0).round() as i32);
        let dy0 = (self.cy0 - y).max((dy - filterw).round() as i32);
        let dy1 = (self.cy1 - y - 1).min((dy + filterw - 1.0).round() as i32);
        if dx1 < dx0 || dy1 < dy0 {
            return;
        }

        let mut density = self.density.lock();
        for j in dy0..=dy1 {
            for i in dx0..=dx1 {
                let weight = self.filter.weight(i as f64 - (dx - 0.5), j as f64 - (dy - 0.5));
                let (px, py) = ((x + i - self.cx0) as usize, (y + j - self.cy0) as usize);
                *density.image.get_mut(px, py) += color * weight;
            }
        }
        density.samples += 1;
    }

    /// Rebuild the dirty mask for the next AA pass and return how many
    /// pixels will be resampled. Runs single-threaded between passes.
    pub fn next_pass(
        &mut self,
        control: &RenderControl,
        monitor: &RenderMonitor,
        adaptive: bool,
        integrator_name: &str,
        skip: bool,
    ) -> usize {
        self.next_area.store(0, Ordering::SeqCst);
        self.completed_areas.store(0, Ordering::SeqCst);
        self.n_pass += 1;
        let images_pass_due = self.images_autosave.get_mut().pass_due();
        let film_pass_due = self.film_autosave.get_mut().pass_due();

        if skip {
            return 0;
        }

        if control.in_progress() {
            if images_pass_due {
                self.flush(control);
                self.images_autosave.get_mut().reset();
            }
            if self.save_requested() && film_pass_due {
                if let Err(e) = self.save_film() {
                    warn!("film autosave failed: {}", e);
                }
                self.film_autosave.get_mut().reset();
            }
        }

        let n_resample;
        if adaptive && self.aa.threshold > 0.0 {
            let raster = self.raster.get_mut();
            let (w, h) = (self.width as usize, self.height as usize);

            // Unsampled pixels (e.g. holes after combining partial films)
            // must render next pass no matter what the estimator says
            for y in 0..h {
                for x in 0..w {
                    self.flags.set(x, y, raster.weights.get(x, y) <= 0.0);
                }
            }

            let combined = raster.layers.iter()
                .find(|(kind, _)| *kind == LayerKind::Combined)
                .map(|(_, image)| image)
                .expect("combined layer is always present");
            let factor_image = raster.layers.iter()
                .find(|(kind, _)| *kind == LayerKind::DebugSamplingFactor)
                .map(|(_, image)| image);
            let normalized = |x: usize, y: usize| combined.get(x, y).normalized(raster.weights.get(x, y));

            let variance_half_edge = (self.aa.variance_edge_size / 2) as i64;
            let mut threshold_scaled = self.aa.threshold;

            for y in 0..h - 1 {
                for x in 0..w - 1 {
                    let weight = raster.weights.get(x, y);
                    if let Some(factors) = factor_image {
                        let factor = if weight > 0.0 { factors.get(x, y).normalized(weight).r } else { 1.0 };
                        if !self.aa.background_resampling && factor == 0.0 {
                            continue;
                        }
                    }

                    let pixel = normalized(x, y);
                    let brightness = pixel.abs_luminance();
                    match self.aa.dark_detection {
                        DarkDetection::Linear { factor } if factor > 0.0 => {
                            threshold_scaled = self.aa.threshold
                                * ((1.0 - factor) + brightness * factor);
                        }
                        DarkDetection::Curve => {
                            threshold_scaled = dark_threshold_curve(brightness);
                        }
                        _ => {}
                    }

                    let mark = |fx: usize, fy: usize, flags: &mut BitGrid| {
                        flags.set(x, y, true);
                        flags.set(fx, fy, true);
                    };
                    if pixel.color_difference(normalized(x + 1, y), self.aa.detect_color_noise) >= threshold_scaled {
                        mark(x + 1, y, &mut self.flags);
                    }
                    if pixel.color_difference(normalized(x, y + 1), self.aa.detect_color_noise) >= threshold_scaled {
                        mark(x, y + 1, &mut self.flags);
                    }
                    if pixel.color_difference(normalized(x + 1, y + 1), self.aa.detect_color_noise) >= threshold_scaled {
                        mark(x + 1, y + 1, &mut self.flags);
                    }
                    if x > 0 && pixel.color_difference(normalized(x - 1, y + 1), self.aa.detect_color_noise) >= threshold_scaled {
                        mark(x - 1, y + 1, &mut self.flags);
                    }

                    if self.aa.variance_pixels > 0 {
                        let mut variance = 0u32;
                        for d in -variance_half_edge..variance_half_edge - 1 {
                            let xi = (x as i64 + d).clamp(0, w as i64 - 2) as usize;
                            let c0 = normalized(xi, y);
                            let c1 = normalized(xi + 1, y);
                            if c0.color_difference(c1, self.aa.detect_color_noise) >= threshold_scaled {
                                variance += 1;
                            }
                            let yi = (y as i64 + d).clamp(0, h as i64 - 2) as usize;
                            let c0 = normalized(x, yi);
                            let c1 = normalized(x, yi + 1);
                            if c0.color_difference(c1, self.aa.detect_color_noise) >= threshold_scaled {
                                variance += 1;
                            }
                        }
                        if variance >= self.aa.variance_pixels {
                            for yd in -variance_half_edge..variance_half_edge {
                                for xd in -variance_half_edge..variance_half_edge {
                                    let xi = (x as i64 + xd).clamp(0, w as i64 - 1) as usize;
                                    let yi = (y as i64 + yd).clamp(0, h as i64 - 1) as usize;
                                    self.flags.set(xi, yi, true);
                                }
                            }
                        }
                    }
                }
            }

            n_resample = self.flags.count();
        } else {
            self.flags.fill(true);
            n_resample = self.total_pixels();
        }

        let mut tag = String::new();
        if control.resumed() {
            tag.push_str("Film loaded + ");
        }
        tag.push_str(&format!(
            "Rendering pass {} of {}, resampling {} pixels.",
            self.n_pass, self.n_passes, n_resample,
        ));
        info!("{}: {}", integrator_name, tag);
        monitor.init_progress(self.total_pixels());
        monitor.set_tag(&tag);

        n_resample
    }

    /// Area completion: refresh the exported snapshot for the region, run
    /// the edge post-layers, fire autosaves and progress.
    pub fn finish_area(&self, area: &RenderArea, control: &RenderControl, monitor: &RenderMonitor) {
        let x0 = (area.x - self.cx0) as usize;
        let y0 = (area.y - self.cy0) as usize;
        let x1 = x0 + area.w as usize;
        let y1 = y0 + area.h as usize;

        {
            let mut raster = self.raster.lock();
            if self.layers.is_defined(LayerKind::DebugFacesEdges) {
                edge::generate_faces_edges(&mut raster, x0, x1, y0, y1, self.layers.edge_params());
            }
            if self.layers.is_defined_any(&[LayerKind::DebugObjectsEdges, LayerKind::Toon]) {
                edge::generate_toon_and_object_edges(&mut raster, x0, x1, y0, y1, self.layers.edge_params());
            }

            let mut exported = self.exported.lock();
            for (kind, snapshot) in exported.iter_mut() {
                let image = raster.layers.iter()
                    .find(|(k, _)| k == kind)
                    .map(|(_, image)| image)
                    .expect("exported layers are a subset of film layers");
                for py in y0..y1 {
                    for px in x0..x1 {
                        let weight = raster.weights.get(px, py);
                        snapshot.set(px, py, export_color(*kind, image.get(px, py), weight));
                    }
                }
            }
        }

        if control.in_progress() {
            if self.images_autosave.lock().time_due() {
                self.flush(control);
                self.images_autosave.lock().reset();
            }
            if self.save_requested() && self.film_autosave.lock().time_due() {
                if let Err(e) = self.save_film() {
                    warn!("film autosave failed: {}", e);
                }
                self.film_autosave.lock().reset();
            }
        }

        let completed = self.completed_areas.fetch_add(1, Ordering::AcqRel) + 1;
        if completed >= self.splitter.len() {
            monitor.done();
        } else {
            monitor.update_progress((area.w * area.h) as usize);
        }
    }

    /// Normalize every exported layer, apply the per-kind post rules and
    /// deliver the result to the outputs.
    pub fn flush(&self, control: &RenderControl) {
        if control.finished() {
            info!("film: flushing buffers");
        }

        let density_factor = if self.estimate_density {
            let density = self.density.lock();
            if density.samples > 0 {
                self.total_pixels() as f32 / density.samples as f32
            } else {
                0.0
            }
        } else {
            0.0
        };

        {
            let mut raster = self.raster.lock();
            let (w, h) = (self.width as usize, self.height as usize);
            if self.layers.is_defined(LayerKind::DebugFacesEdges) {
                edge::generate_faces_edges(&mut raster, 0, w, 0, h, self.layers.edge_params());
            }
            if self.layers.is_defined_any(&[LayerKind::DebugObjectsEdges, LayerKind::Toon]) {
                edge::generate_toon_and_object_edges(&mut raster, 0, w, 0, h, self.layers.edge_params());
            }

            let density = self.density.lock();
            let mut exported = self.exported.lock();
            for (kind, snapshot) in exported.iter_mut() {
                let image = raster.layers.iter()
                    .find(|(k, _)| k == kind)
                    .map(|(_, image)| image)
                    .expect("exported layers are a subset of film layers");
                for py in 0..h {
                    for px in 0..w {
                        let weight = raster.weights.get(px, py);
                        let mut color = export_color(*kind, image.get(px, py), weight);
                        if *kind == LayerKind::Combined && density_factor > 0.0 {
                            let boost = density.image.get(px, py) * density_factor;
                            color += Rgba::from_rgb(boost, 0.0);
                        }
                        snapshot.set(px, py, color);
                    }
                }
            }
        }

        let dropped = self.dropped_samples.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("film: {} samples dropped for non-finite values", dropped);
        }

        let exported = self.exported.lock();
        let mut outputs = self.outputs.lock();
        for output in outputs.iter_mut() {
            for layer in self.layers.exported() {
                let pixels = exported.iter()
                    .find(|(k, _)| *k == layer.kind)
                    .map(|(_, pixels)| pixels)
                    .expect("exported snapshot matches exported layers");
                if let Err(e) = output.flush_layer(layer.kind, &layer.exported_name, pixels, false) {
                    warn!("output flush for layer '{}' failed: {}", layer.kind.name(), e);
                }
            }
        }

        if control.finished() && self.save_requested() {
            if let Err(e) = self.save_film() {
                warn!("film save at completion failed: {}", e);
            }
        }
    }

    /// Normalized pixels of a layer straight from the accumulators
    pub fn normalized_pixels(&self, kind: LayerKind) -> Option<Buffer2D<Rgba>> {
        let raster = self.raster.lock();
        let image = raster.layers.iter().find(|(k, _)| *k == kind).map(|(_, image)| image)?;
        let mut out = Buffer2D::new(self.width as usize, self.height as usize);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                out.set(x, y, export_color(kind, image.get(x, y), raster.weights.get(x, y)));
            }
        }
        Some(out)
    }

    /// Raw accumulated weight at a canvas-relative pixel
    pub fn weight_at(&self, x: usize, y: usize) -> f32 {
        self.raster.lock().weights.get(x, y)
    }
}

/// Per-kind post rule applied when a pixel leaves the accumulators
fn export_color(kind: LayerKind, accumulated: Rgba, weight: f32) -> Rgba {
    if kind.exports_weight() {
        return Rgba::gray(weight);
    }
    let mut color = accumulated.normalized(weight);
    if kind.rounds_up_on_export() {
        color.ceil();
    }
    color
}

/// Piecewise-linear noise threshold over pixel brightness, used by the
/// curve dark-detection mode. Darker pixels get a much stricter threshold.
fn dark_threshold_curve(brightness: f32) -> f32 {
    const ANCHORS: [(f32, f32); 13] = [
        (0.10, 1.0e-4), (0.20, 1.0e-3), (0.30, 2.0e-3), (0.40, 3.5e-3),
        (0.50, 5.5e-3), (0.60, 7.5e-3), (0.70, 1.0e-2), (0.80, 1.5e-2),
        (0.90, 2.5e-2), (1.00, 4.0e-2), (1.20, 8.0e-2), (1.40, 9.5e-2),
        (1.80, 1.0e-1),
    ];
    if brightness <= ANCHORS[0].0 {
        return ANCHORS[0].1;
    }
    for pair in ANCHORS.windows(2) {
        let (l0, t0) = pair[0];
        let (l1, t1) = pair[1];
        if brightness <= l1 {
            return t0 + (brightness - l0) * (t1 - t0) / (l1 - l0);
        }
    }
    0.1
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::Layers;

    fn film(width: i32, height: i32, filter: FilterKind, threshold: f32) -> ImageFilm {
        let mut layers = Layers::new();
        layers.define(LayerKind::Env);
        let mut film = ImageFilm::new(FilmParams {
            width, height,
            filter,
            filter_width: 1.5,
            aa: AaNoiseParams { threshold, ..AaNoiseParams::default() },
            layers,
            ..FilmParams::default()
        }).unwrap();
        film.init(1);
        film
    }

    fn scratch(film: &ImageFilm) -> ColorLayers {
        ColorLayers::new(film.layers())
    }

    #[test]
    fn weight_matches_filter_footprint() {
        let film = film(5, 5, FilterKind::Box, 0.0);
        let mut layers = scratch(&film);
        layers.set(LayerKind::Combined, Rgba::new(1.0, 1.0, 1.0, 1.0));
        film.add_sample(2, 2, 0.5, 0.5, 0, 0, &layers);

        // box footprint is exactly one pixel
        assert_eq!(film.weight_at(2, 2), 1.0);
        assert_eq!(film.weight_at(1, 2), 0.0);
        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        assert_eq!(combined.get(2, 2), Rgba::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(combined.get(1, 2), Rgba::TRANSPARENT);
    }

    #[test]
    fn gauss_sample_normalizes_everywhere_in_footprint() {
        let film = film(5, 5, FilterKind::Gauss, 0.0);
        let mut layers = scratch(&film);
        layers.set(LayerKind::Combined, Rgba::new(1.0, 1.0, 1.0, 1.0));
        film.add_sample(2, 2, 0.5, 0.5, 0, 0, &layers);

        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        for y in 0..5usize {
            for x in 0..5usize {
                if film.weight_at(x, y) > 0.0 {
                    let c = combined.get(x, y);
                    // accumulator and weight scale by the same filter weight
                    assert!((c.r - 1.0).abs() < 1e-6 && (c.a - 1.0).abs() < 1e-6);
                }
            }
        }
        assert!(film.weight_at(2, 2) > 0.0);
    }

    #[test]
    fn footprint_clips_at_canvas_edge() {
        let film = film(4, 4, FilterKind::Gauss, 0.0);
        let mut layers = scratch(&film);
        layers.set(LayerKind::Combined, Rgba::new(1.0, 0.0, 0.0, 1.0));
        // deposit at the very corner; nothing may escape the canvas
        film.add_sample(0, 0, 0.1, 0.1, 0, 0, &layers);
        assert!(film.weight_at(0, 0) > 0.0);
    }

    #[test]
    fn nan_samples_are_dropped() {
        let film = film(4, 4, FilterKind::Box, 0.0);
        let mut layers = scratch(&film);
        layers.set(LayerKind::Combined, Rgba::new(f32::NAN, 0.0, 0.0, 1.0));
        film.add_sample(1, 1, 0.5, 0.5, 0, 0, &layers);
        assert_eq!(film.dropped_samples(), 1);
        assert_eq!(film.weight_at(1, 1), 0.0);
    }

    #[test]
    fn non_adaptive_pass_resamples_everything() {
        let mut film = film(8, 8, FilterKind::Box, 0.0);
        let control = RenderControl::new();
        let monitor = RenderMonitor::silent();
        let n = film.next_pass(&control, &monitor, true, "test", false);
        assert_eq!(n, 64);
        assert!(film.should_sample(3, 3));
    }

    #[test]
    fn adaptive_pass_clears_uniform_regions() {
        let mut film = film(8, 8, FilterKind::Box, 1e-3);
        let control = RenderControl::new();
        let monitor = RenderMonitor::silent();
        let mut layers = scratch(&film);
        layers.set(LayerKind::Combined, Rgba::new(0.5, 0.5, 0.5, 1.0));
        for y in 0..8 {
            for x in 0..8 {
                film.add_sample(x, y, 0.5, 0.5, 0, 0, &layers);
            }
        }
        let n = film.next_pass(&control, &monitor, true, "test", false);
        assert_eq!(n, 0);
        assert!(!film.should_sample(4, 4));
    }

    #[test]
    fn adaptive_pass_marks_contrast_neighbourhoods() {
        let mut film = film(8, 8, FilterKind::Box, 1e-3);
        let control = RenderControl::new();
        let monitor = RenderMonitor::silent();
        let mut layers = scratch(&film);
        for y in 0..8 {
            for x in 0..8 {
                let v = if x == 3 && y == 3 { 1.0 } else { 0.0 };
                layers.set(LayerKind::Combined, Rgba::new(v, v, v, 1.0));
                film.add_sample(x, y, 0.5, 0.5, 0, 0, &layers);
            }
        }
        let n = film.next_pass(&control, &monitor, true, "test", false);
        assert!(n > 0);
        assert!(film.should_sample(3, 3));
    }

    #[test]
    fn skipped_pass_resamples_nothing() {
        let mut film = film(8, 8, FilterKind::Box, 1e-3);
        let control = RenderControl::new();
        let monitor = RenderMonitor::silent();
        assert_eq!(film.next_pass(&control, &monitor, true, "test", true), 0);
    }

    #[test]
    fn dark_curve_shape() {
        assert_eq!(dark_threshold_curve(0.05), 1.0e-4);
        assert_eq!(dark_threshold_curve(2.5), 0.1);
        let mid = dark_threshold_curve(0.25);
        assert!(mid > 1.0e-3 && mid < 2.0e-3);
        // monotone over the anchor range
        let mut last = 0.0;
        for i in 0..30 {
            let t = dark_threshold_curve(i as f32 * 0.1);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn tile_dispenser_hands_out_each_area_once() {
        let film = film(64, 64, FilterKind::Box, 0.0);
        let mut seen = std::collections::HashSet::new();
        while let Some(area) = film.next_area() {
            assert!(seen.insert(area.id));
        }
        assert_eq!(seen.len(), film.area_count());
    }
}
