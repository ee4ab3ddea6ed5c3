//! Synthetic attribute slot assignment.
//!
//! Fixed-function stages that inject attributes (front-face flag, AA/wide
//! line coords, point sprite coords) reserve their slots here. The table is
//! rebuilt from scratch once per prepare cycle by a single builder pass that
//! visits potentially-active stages in a fixed order, then frozen; nothing
//! mutates it mid-draw.

use hashbrown::HashMap;

use crate::error::DrawError;
use crate::shader::MAX_SHADER_OUTPUTS;

/// Cap on synthetic slots per prepare cycle.
pub const MAX_EXTRA_SLOTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtraSemantic {
    /// x > 0 means front-facing; injected by the unfilled stage.
    FrontFace,
    /// Perpendicular distance from the line center-line, for wide/AA lines.
    LineCoord,
    /// Quad-local texcoord for wide/AA points and point sprites.
    PointCoord,
}

#[derive(Debug, Default)]
pub struct ExtraSlotsBuilder {
    base: usize,
    next: usize,
    map: HashMap<(ExtraSemantic, u32), usize>,
}

impl ExtraSlotsBuilder {
    /// `base` is the bound shader stage's output slot count; synthetic
    /// slots are appended after it.
    pub fn new(base: usize) -> Self {
        Self {
            base,
            next: 0,
            map: HashMap::new(),
        }
    }

    /// Reserve (or re-find) the slot for `(semantic, index)`.
    pub fn reserve(&mut self, semantic: ExtraSemantic, index: u32) -> Result<usize, DrawError> {
        if let Some(&slot) = self.map.get(&(semantic, index)) {
            return Ok(slot);
        }
        if self.next >= MAX_EXTRA_SLOTS || self.base + self.next >= MAX_SHADER_OUTPUTS {
            return Err(DrawError::ExtraSlotsExhausted(self.next));
        }
        let slot = self.base + self.next;
        self.next += 1;
        self.map.insert((semantic, index), slot);
        Ok(slot)
    }

    pub fn build(self) -> ExtraSlots {
        ExtraSlots {
            base: self.base,
            extra: self.next,
            map: self.map,
        }
    }
}

/// Frozen slot assignment for one prepare cycle.
#[derive(Clone, Debug, Default)]
pub struct ExtraSlots {
    base: usize,
    extra: usize,
    map: HashMap<(ExtraSemantic, u32), usize>,
}

impl ExtraSlots {
    pub fn slot(&self, semantic: ExtraSemantic, index: u32) -> Option<usize> {
        self.map.get(&(semantic, index)).copied()
    }

    /// Shader output slots plus synthetic slots: the vertex stride (in
    /// float4 records) every pipeline vertex carries this cycle.
    pub fn total_slots(&self) -> usize {
        self.base + self.extra
    }

    pub fn num_extra(&self) -> usize {
        self.extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_is_idempotent_and_appends_after_base() {
        let mut b = ExtraSlotsBuilder::new(3);
        let a = b.reserve(ExtraSemantic::LineCoord, 0).unwrap();
        let c = b.reserve(ExtraSemantic::FrontFace, 0).unwrap();
        assert_eq!(a, 3);
        assert_eq!(c, 4);
        assert_eq!(b.reserve(ExtraSemantic::LineCoord, 0).unwrap(), 3);
        let slots = b.build();
        assert_eq!(slots.total_slots(), 5);
        assert_eq!(slots.slot(ExtraSemantic::FrontFace, 0), Some(4));
        assert_eq!(slots.slot(ExtraSemantic::PointCoord, 0), None);
    }

    #[test]
    fn exhaustion_is_a_config_error() {
        let mut b = ExtraSlotsBuilder::new(MAX_SHADER_OUTPUTS - 1);
        assert!(b.reserve(ExtraSemantic::LineCoord, 0).is_ok());
        assert!(matches!(
            b.reserve(ExtraSemantic::PointCoord, 0),
            Err(DrawError::ExtraSlotsExhausted(_))
        ));
    }
}
