use crate::layer::{ LayerFlags, LayerKind, Layers };
use super::Rgba;

/// Per-ray scratch storage for every enabled layer. One instance lives on
/// each worker thread and is reset before each sample; it is never shared.
#[derive(Debug, Clone)]
pub struct ColorLayers {
    entries: Vec<(LayerKind, Rgba)>,
    flags: LayerFlags,
}

impl ColorLayers {
    pub fn new(layers: &Layers) -> ColorLayers {
        let entries = layers.iter()
            .map(|layer| (layer.kind, layer.kind.default_color()))
            .collect();
        ColorLayers { entries, flags: layers.flags() }
    }

    /// Flags of the whole registry, used to gate per-group integrator work
    #[inline]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    pub fn set_default_colors(&mut self) {
        for (kind, color) in self.entries.iter_mut() {
            *color = kind.default_color();
        }
    }

    pub fn find_mut(&mut self, kind: LayerKind) -> Option<&mut Rgba> {
        self.entries.iter_mut()
            .find(|(k, _)| *k == kind)
            .map(|(_, color)| color)
    }

    pub fn get(&self, kind: LayerKind) -> Option<Rgba> {
        self.entries.iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, color)| *color)
    }

    pub fn set(&mut self, kind: LayerKind, color: Rgba) {
        if let Some(slot) = self.find_mut(kind) {
            *slot = color;
        }
    }

    /// Add to a layer if it is defined
    pub fn accumulate(&mut self, kind: LayerKind, color: Rgba) {
        if let Some(slot) = self.find_mut(kind) {
            *slot += color;
        }
    }

    pub fn is_defined(&self, kind: LayerKind) -> bool {
        self.entries.iter().any(|(k, _)| *k == kind)
    }

    pub fn is_defined_any(&self, kinds: &[LayerKind]) -> bool {
        kinds.iter().any(|&kind| self.is_defined(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerKind, Rgba)> + '_ {
        self.entries.iter().map(|(kind, color)| (*kind, *color))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (LayerKind, &mut Rgba)> {
        self.entries.iter_mut().map(|(kind, color)| (*kind, color))
    }

    /// True if any stored value is non-finite. Such samples are dropped
    /// before they can poison the film accumulators.
    pub fn has_nan(&self) -> bool {
        self.entries.iter().any(|(_, color)| color.has_nan())
    }
}
