use crate::background::Background;
use crate::camera::Camera;
use crate::color::Rgb;
use crate::layer::Layers;
use crate::light::Light;
use crate::material::Material;
use crate::primitive::Accelerator;
use crate::space::*;
use crate::volume::VolumeIntegrator;

/// Stable index of a material in the scene's material arena. Primitives
/// and surface hits refer to materials through these instead of pointers,
/// which keeps the scene shareable across threads and survives film
/// reloads unambiguously.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaterialRef(pub usize);

/// Ambient-occlusion configuration, enabled when any AO layer is defined
#[derive(Debug, Copy, Clone)]
pub struct AoParams {
    pub samples: u32,
    pub distance: f64,
    pub color: Rgb,
}

impl Default for AoParams {
    fn default() -> AoParams {
        AoParams { samples: 8, distance: 1.0, color: Rgb::WHITE }
    }
}

/// Scene-wide render behaviour knobs
#[derive(Debug, Clone)]
pub struct SceneSettings {
    /// Fixed shadow bias; `None` selects automatic calibration from the
    /// scene bounds
    pub shadow_bias: Option<f64>,
    pub transparent_background: bool,
    pub transparent_refracted_background: bool,
    pub transparent_shadows: bool,
    /// Max transparent occluders a shadow ray may pass through
    pub shadow_depth: u32,
    pub ao: AoParams,
    /// Highest user-assigned indices, for the normalized index layers
    pub object_index_highest: u32,
    pub material_index_highest: u32,
}

impl Default for SceneSettings {
    fn default() -> SceneSettings {
        SceneSettings {
            shadow_bias: None,
            transparent_background: false,
            transparent_refracted_background: false,
            transparent_shadows: false,
            shadow_depth: 8,
            ao: AoParams::default(),
            object_index_highest: 1,
            material_index_highest: 1,
        }
    }
}

const SHADOW_BIAS: f64 = 0.0005;

/// Immutable aggregate of everything a render pass reads: camera,
/// background, lights, accelerator, materials, volume and layer registry.
/// Workers share it by reference; it outlives every pass.
pub struct SceneView<'s> {
    pub camera: &'s dyn Camera,
    pub background: Option<&'s dyn Background>,
    pub lights: &'s [Box<dyn Light>],
    pub accelerator: &'s dyn Accelerator,
    pub materials: &'s [Box<dyn Material>],
    pub volume: Option<&'s dyn VolumeIntegrator>,
    pub layers: Layers,
    pub settings: SceneSettings,
    bias_floor: f64,
}

impl<'s> SceneView<'s> {
    pub fn new(
        camera: &'s dyn Camera,
        accelerator: &'s dyn Accelerator,
        materials: &'s [Box<dyn Material>],
        layers: Layers,
    ) -> SceneView<'s> {
        // calibrate the automatic shadow-bias floor once, from the scene extent
        let diagonal = accelerator.bounds().diagonal_length();
        let bias_floor = if diagonal.is_finite() && diagonal > 0.0 {
            SHADOW_BIAS * diagonal.max(1.0)
        } else {
            SHADOW_BIAS
        };
        SceneView {
            camera,
            background: None,
            lights: &[],
            accelerator,
            materials,
            volume: None,
            layers,
            settings: SceneSettings::default(),
            bias_floor,
        }
    }

    pub fn with_background(mut self, background: &'s dyn Background) -> SceneView<'s> {
        self.background = Some(background);
        self
    }

    pub fn with_lights(mut self, lights: &'s [Box<dyn Light>]) -> SceneView<'s> {
        self.lights = lights;
        self
    }

    pub fn with_volume(mut self, volume: &'s dyn VolumeIntegrator) -> SceneView<'s> {
        self.volume = Some(volume);
        self
    }

    pub fn with_settings(mut self, settings: SceneSettings) -> SceneView<'s> {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn material(&self, r: MaterialRef) -> &dyn Material {
        self.materials[r.0].as_ref()
    }

    /// Self-shadowing bias at a point: the calibrated floor, scaled up far
    /// away from the origin where float precision drops
    pub fn shadow_bias_at(&self, p: &Point) -> f64 {
        let scale = p.to_vec().magnitude().max(1.0);
        match self.settings.shadow_bias {
            Some(bias) => bias * scale,
            None => self.bias_floor.max(SHADOW_BIAS * scale),
        }
    }
}
