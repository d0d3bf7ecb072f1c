use std::collections::BTreeMap;
use bitflags::bitflags;
use crate::color::Rgba;

bitflags! {
    /// Groups of layer kinds. The integrator checks these before doing any
    /// per-group work, so a scene without index layers never pays for index
    /// lookups.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct LayerFlags: u32 {
        const BASIC   = 1 << 0;
        const DEPTH   = 1 << 1;
        const DIFFUSE = 1 << 2;
        const INDEX   = 1 << 3;
        const DEBUG   = 1 << 4;
    }
}

/// Every output channel the film can accumulate. `Combined` is always
/// present; everything else is opt-in through the [`Layers`] registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    Combined,
    ZDepthNorm,
    ZDepthAbs,
    Mist,
    NormalSmooth,
    NormalGeom,
    Uv,
    Emit,
    Diffuse,
    DiffuseIndirect,
    DiffuseColor,
    Glossy,
    GlossyIndirect,
    GlossyColor,
    Trans,
    TransIndirect,
    TransColor,
    ReflectPerfect,
    RefractPerfect,
    ReflectAll,
    RefractAll,
    Indirect,
    IndirectAll,
    Ao,
    AoClay,
    Env,
    ObjIndexAbs,
    ObjIndexNorm,
    ObjIndexAuto,
    ObjIndexMask,
    MatIndexAbs,
    MatIndexNorm,
    MatIndexAuto,
    MatIndexMask,
    VolumeTransmittance,
    VolumeIntegration,
    AaSamples,
    DebugDpdu,
    DebugDpdv,
    DebugDpdx,
    DebugDpdy,
    DebugDudxDvdx,
    DebugDudyDvdy,
    DebugSamplingFactor,
    DebugObjectsEdges,
    DebugFacesEdges,
    Toon,
}

impl LayerKind {
    pub const ALL: &'static [LayerKind] = &[
        LayerKind::Combined, LayerKind::ZDepthNorm, LayerKind::ZDepthAbs,
        LayerKind::Mist, LayerKind::NormalSmooth, LayerKind::NormalGeom,
        LayerKind::Uv, LayerKind::Emit, LayerKind::Diffuse,
        LayerKind::DiffuseIndirect, LayerKind::DiffuseColor, LayerKind::Glossy,
        LayerKind::GlossyIndirect, LayerKind::GlossyColor, LayerKind::Trans,
        LayerKind::TransIndirect, LayerKind::TransColor, LayerKind::ReflectPerfect,
        LayerKind::RefractPerfect, LayerKind::ReflectAll, LayerKind::RefractAll,
        LayerKind::Indirect, LayerKind::IndirectAll, LayerKind::Ao,
        LayerKind::AoClay, LayerKind::Env, LayerKind::ObjIndexAbs,
        LayerKind::ObjIndexNorm, LayerKind::ObjIndexAuto, LayerKind::ObjIndexMask,
        LayerKind::MatIndexAbs, LayerKind::MatIndexNorm, LayerKind::MatIndexAuto,
        LayerKind::MatIndexMask, LayerKind::VolumeTransmittance,
        LayerKind::VolumeIntegration, LayerKind::AaSamples, LayerKind::DebugDpdu,
        LayerKind::DebugDpdv, LayerKind::DebugDpdx, LayerKind::DebugDpdy,
        LayerKind::DebugDudxDvdx, LayerKind::DebugDudyDvdy,
        LayerKind::DebugSamplingFactor, LayerKind::DebugObjectsEdges,
        LayerKind::DebugFacesEdges, LayerKind::Toon,
    ];

    pub fn flags(self) -> LayerFlags {
        use LayerKind::*;
        match self {
            Combined | Emit | Env | ReflectPerfect | RefractPerfect
            | ReflectAll | RefractAll | Indirect | IndirectAll
            | VolumeTransmittance | VolumeIntegration | AaSamples => LayerFlags::BASIC,
            ZDepthNorm | ZDepthAbs | Mist => LayerFlags::DEPTH,
            Diffuse | DiffuseIndirect | DiffuseColor | Glossy | GlossyIndirect
            | GlossyColor | Trans | TransIndirect | TransColor | Ao | AoClay => LayerFlags::DIFFUSE,
            ObjIndexAbs | ObjIndexNorm | ObjIndexAuto | ObjIndexMask
            | MatIndexAbs | MatIndexNorm | MatIndexAuto | MatIndexMask => LayerFlags::INDEX,
            NormalSmooth | NormalGeom | Uv | DebugDpdu | DebugDpdv | DebugDpdx
            | DebugDpdy | DebugDudxDvdx | DebugDudyDvdy | DebugSamplingFactor
            | DebugObjectsEdges | DebugFacesEdges | Toon => LayerFlags::DEBUG,
        }
    }

    pub fn name(self) -> &'static str {
        use LayerKind::*;
        match self {
            Combined => "combined",
            ZDepthNorm => "z-depth-norm",
            ZDepthAbs => "z-depth-abs",
            Mist => "mist",
            NormalSmooth => "normal-smooth",
            NormalGeom => "normal-geom",
            Uv => "uv",
            Emit => "emit",
            Diffuse => "diffuse",
            DiffuseIndirect => "diffuse-indirect",
            DiffuseColor => "diffuse-color",
            Glossy => "glossy",
            GlossyIndirect => "glossy-indirect",
            GlossyColor => "glossy-color",
            Trans => "trans",
            TransIndirect => "trans-indirect",
            TransColor => "trans-color",
            ReflectPerfect => "reflect-perfect",
            RefractPerfect => "refract-perfect",
            ReflectAll => "reflect-all",
            RefractAll => "refract-all",
            Indirect => "indirect",
            IndirectAll => "indirect-all",
            Ao => "ao",
            AoClay => "ao-clay",
            Env => "env",
            ObjIndexAbs => "obj-index-abs",
            ObjIndexNorm => "obj-index-norm",
            ObjIndexAuto => "obj-index-auto",
            ObjIndexMask => "obj-index-mask",
            MatIndexAbs => "mat-index-abs",
            MatIndexNorm => "mat-index-norm",
            MatIndexAuto => "mat-index-auto",
            MatIndexMask => "mat-index-mask",
            VolumeTransmittance => "volume-transmittance",
            VolumeIntegration => "volume-integration",
            AaSamples => "aa-samples",
            DebugDpdu => "debug-dpdu",
            DebugDpdv => "debug-dpdv",
            DebugDpdx => "debug-dpdx",
            DebugDpdy => "debug-dpdy",
            DebugDudxDvdx => "debug-dudx-dvdx",
            DebugDudyDvdy => "debug-dudy-dvdy",
            DebugSamplingFactor => "debug-sampling-factor",
            DebugObjectsEdges => "debug-objects-edges",
            DebugFacesEdges => "debug-faces-edges",
            Toon => "toon",
        }
    }

    pub fn from_name(name: &str) -> Option<LayerKind> {
        LayerKind::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Starting value a fresh sample carries for this layer
    pub fn default_color(self) -> Rgba {
        Rgba::TRANSPARENT
    }

    /// True for kinds whose exported value is the raw per-pixel weight
    pub fn exports_weight(self) -> bool {
        self == LayerKind::AaSamples
    }

    /// Index layers must not stay fractional after filtering
    pub fn rounds_up_on_export(self) -> bool {
        matches!(self, LayerKind::ObjIndexAbs | LayerKind::MatIndexAbs)
    }

    pub fn is_mask(self) -> bool {
        matches!(self, LayerKind::ObjIndexMask | LayerKind::MatIndexMask)
    }
}

/// Controls for the object/material index mask layers
#[derive(Debug, Copy, Clone, Default)]
pub struct MaskParams {
    pub obj_index: u32,
    pub mat_index: u32,
    /// False = mask in, true = mask out
    pub invert: bool,
    /// False = mask is composed with the combined color, true = mask only
    pub only: bool,
}

/// Controls for the edge detection and toon post layers
#[derive(Debug, Clone)]
pub struct EdgeParams {
    pub thickness: i32,
    pub threshold: f32,
    pub smoothness: f32,
    pub toon_color: [f32; 3],
    pub toon_quantization: f32,
    pub face_thickness: i32,
    pub face_threshold: f32,
}

impl Default for EdgeParams {
    fn default() -> EdgeParams {
        EdgeParams {
            thickness: 2,
            threshold: 0.3,
            smoothness: 0.75,
            toon_color: [0.0, 0.0, 0.0],
            toon_quantization: 0.1,
            face_thickness: 1,
            face_threshold: 0.01,
        }
    }
}

/// One registered output channel
#[derive(Debug, Clone)]
pub struct Layer {
    pub kind: LayerKind,
    pub exported: bool,
    /// File name tag used when the layer is written out on its own
    pub exported_name: String,
}

/// The set of channels enabled for a render. Fixed once the film is built;
/// the registration order determines the layer order in the film file.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    map: BTreeMap<LayerKind, Layer>,
    flags: LayerFlags,
    mask_params: MaskParams,
    edge_params: EdgeParams,
}

impl Layers {
    /// New registry with only the combined layer defined and exported
    pub fn new() -> Layers {
        let mut layers = Layers::default();
        layers.define_exported(LayerKind::Combined, "combined");
        layers
    }

    pub fn define(&mut self, kind: LayerKind) {
        self.flags |= kind.flags();
        self.map.entry(kind).or_insert(Layer {
            kind,
            exported: false,
            exported_name: kind.name().to_string(),
        });
    }

    pub fn define_exported(&mut self, kind: LayerKind, name: &str) {
        self.define(kind);
        let layer = self.map.get_mut(&kind).unwrap();
        layer.exported = true;
        layer.exported_name = name.to_string();
    }

    #[inline]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    #[inline]
    pub fn is_defined(&self, kind: LayerKind) -> bool {
        kind == LayerKind::Combined || self.map.contains_key(&kind)
    }

    pub fn is_defined_any(&self, kinds: &[LayerKind]) -> bool {
        kinds.iter().any(|&kind| self.is_defined(kind))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Layers in registration (key) order; this is the film file layer order
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.map.values()
    }

    pub fn exported(&self) -> impl Iterator<Item = &Layer> {
        self.map.values().filter(|layer| layer.exported)
    }

    pub fn mask_params(&self) -> &MaskParams {
        &self.mask_params
    }

    pub fn set_mask_params(&mut self, params: MaskParams) {
        self.mask_params = params;
    }

    pub fn edge_params(&self) -> &EdgeParams {
        &self.edge_params
    }

    pub fn set_edge_params(&mut self, params: EdgeParams) {
        self.edge_params = params;
    }
}
