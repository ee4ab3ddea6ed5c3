//! Backend sink contract: the opaque consumer of finished vertex buffers
//! and index lists, plus a capturing implementation used by tests.

use crate::state::Rasterizer;
use crate::stats::DrawStats;
use crate::topology::PrimitiveTopology;

/// The rasterizer/hardware submission seam.
///
/// Call sequence per batch: `set_primitive`, `allocate_vertices`, write
/// through `vertices_mut`, one or more `draw_arrays`/`draw_elements`, then
/// `release_vertices`. Vertices are tightly packed `f32`s,
/// `stride_floats` per vertex.
pub trait RenderSink {
    fn set_primitive(&mut self, topology: PrimitiveTopology);

    /// Reserve room for `count` vertices. Returning `false` signals
    /// resource exhaustion; the caller retries with a smaller batch or
    /// drops the work with a warning, never panics.
    fn allocate_vertices(&mut self, stride_floats: usize, count: usize) -> bool;

    /// The mapped vertex region; valid between `allocate_vertices` and
    /// `release_vertices`.
    fn vertices_mut(&mut self) -> &mut [f32];

    fn draw_arrays(&mut self, start: u32, count: u32);

    fn draw_elements(&mut self, indices: &[u16]);

    fn release_vertices(&mut self);

    /// Driver override for "does this state/topology combination need the
    /// fixed-function pipeline". `None` defers to the built-in policy.
    fn need_pipeline(&self, _rast: &Rasterizer, _topology: PrimitiveTopology) -> Option<bool> {
        None
    }

    /// The backend runs its own shading; the middle-end skips it.
    fn bypass_shading(&self) -> bool {
        false
    }

    fn report_statistics(&mut self, _stats: &DrawStats) {}
}

/// One submission captured by [`CaptureSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedDraw {
    pub topology: PrimitiveTopology,
    pub stride_floats: usize,
    pub vertices: Vec<f32>,
    pub kind: CapturedDrawKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CapturedDrawKind {
    Arrays { start: u32, count: u32 },
    Elements(Vec<u16>),
}

impl CapturedDraw {
    pub fn vertex(&self, i: usize) -> &[f32] {
        &self.vertices[i * self.stride_floats..(i + 1) * self.stride_floats]
    }

    /// Resolve the submission to a flat list of vertex indices.
    pub fn indices(&self) -> Vec<u16> {
        match &self.kind {
            CapturedDrawKind::Arrays { start, count } => {
                (*start..start + count).map(|i| i as u16).collect()
            }
            CapturedDrawKind::Elements(e) => e.clone(),
        }
    }
}

/// In-memory sink that records every submission; the test backend.
#[derive(Debug, Default)]
pub struct CaptureSink {
    topology: Option<PrimitiveTopology>,
    stride_floats: usize,
    mapped: Vec<f32>,
    pub draws: Vec<CapturedDraw>,
    /// When set, `allocate_vertices` fails for counts above this.
    pub allocation_limit: Option<usize>,
    pub stats_reports: Vec<DrawStats>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_vertices_referenced(&self) -> usize {
        self.draws.iter().map(|d| d.indices().len()).sum()
    }
}

impl RenderSink for CaptureSink {
    fn set_primitive(&mut self, topology: PrimitiveTopology) {
        self.topology = Some(topology);
    }

    fn allocate_vertices(&mut self, stride_floats: usize, count: usize) -> bool {
        if let Some(limit) = self.allocation_limit {
            if count > limit {
                return false;
            }
        }
        self.stride_floats = stride_floats;
        self.mapped = vec![0.0; stride_floats * count];
        true
    }

    fn vertices_mut(&mut self) -> &mut [f32] {
        &mut self.mapped
    }

    fn draw_arrays(&mut self, start: u32, count: u32) {
        self.draws.push(CapturedDraw {
            topology: self.topology.expect("set_primitive before draw"),
            stride_floats: self.stride_floats,
            vertices: self.mapped.clone(),
            kind: CapturedDrawKind::Arrays { start, count },
        });
    }

    fn draw_elements(&mut self, indices: &[u16]) {
        self.draws.push(CapturedDraw {
            topology: self.topology.expect("set_primitive before draw"),
            stride_floats: self.stride_floats,
            vertices: self.mapped.clone(),
            kind: CapturedDrawKind::Elements(indices.to_vec()),
        });
    }

    fn release_vertices(&mut self) {
        self.mapped = Vec::new();
    }

    fn report_statistics(&mut self, stats: &DrawStats) {
        self.stats_reports.push(*stats);
    }
}
