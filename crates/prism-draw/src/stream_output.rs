//! Stream output: captures post-shade (post-GS) vertices into bound
//! target buffers, whole primitives at a time.
//!
//! Capture is all-or-nothing per primitive: if any referenced target lacks
//! room for every vertex of the primitive, the primitive is skipped and
//! counted as an overflow — no partial primitive is ever written.

use tracing::{debug, warn};

use crate::error::DrawError;
use crate::shader::{ShaderInfo, VertexBlock, MAX_VERTEX_STREAMS};
use crate::stats::DrawStats;
use crate::topology::PrimitiveTopology;

/// Upper bound on simultaneously bound stream-output targets.
pub const MAX_SO_TARGETS: usize = 4;

/// One capture declaration: which components of which output slot land
/// where in which target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoDeclaration {
    /// GS vertex stream this declaration reads from.
    pub stream: usize,
    /// Output slot in the shaded vertex.
    pub register: usize,
    /// First component of the slot (0..=3).
    pub start_component: usize,
    /// Components captured (1..=4).
    pub num_components: usize,
    /// Target buffer index.
    pub target: usize,
    /// Destination offset within one vertex's record, in floats.
    pub dst_offset: usize,
}

/// The full capture layout: declarations plus per-target vertex strides
/// (in floats).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoLayout {
    pub decls: Vec<SoDeclaration>,
    pub strides: [u32; MAX_SO_TARGETS],
}

impl SoLayout {
    pub fn is_active(&self) -> bool {
        !self.decls.is_empty()
    }

    /// Streams any declaration captures from, as a bitmask.
    pub fn stream_mask(&self) -> u32 {
        self.decls.iter().fold(0, |m, d| m | (1 << d.stream))
    }

    pub fn validate(&self, info: &ShaderInfo, num_targets: usize) -> Result<(), DrawError> {
        for d in &self.decls {
            if d.stream >= MAX_VERTEX_STREAMS {
                return Err(DrawError::StreamOutputStreamOutOfRange {
                    stream: d.stream,
                    limit: MAX_VERTEX_STREAMS,
                });
            }
            if d.target >= num_targets || d.target >= MAX_SO_TARGETS {
                return Err(DrawError::StreamOutputTargetOutOfRange {
                    buffer: d.target,
                    bound: num_targets.min(MAX_SO_TARGETS),
                });
            }
            if d.register >= info.num_outputs {
                return Err(DrawError::OutputSlotOutOfRange {
                    declared: info.num_outputs,
                    slot: d.register,
                    role: "stream output",
                });
            }
            if d.num_components == 0 || d.start_component + d.num_components > 4 {
                return Err(DrawError::StreamOutputComponentOutOfRange {
                    start: d.start_component,
                    count: d.num_components,
                });
            }
            // Every vertex of a captured primitive must fit inside the
            // target's stride; `capture` slices on that assumption.
            let stride = self.strides[d.target] as usize;
            if d.dst_offset + d.num_components > stride {
                return Err(DrawError::StreamOutputStrideOverrun {
                    target: d.target,
                    offset: d.dst_offset,
                    needed: d.num_components,
                    stride,
                });
            }
        }
        Ok(())
    }
}

/// One bound capture buffer with its persistent append offset. The offset
/// survives across draws until the target is rebound.
#[derive(Clone, Debug, Default)]
pub struct SoTarget {
    pub data: Vec<f32>,
    /// Floats written so far.
    pub offset: usize,
}

impl SoTarget {
    pub fn with_capacity(floats: usize) -> Self {
        Self {
            data: vec![0.0; floats],
            offset: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

/// How many vertices one primitive of `topology` carries once decomposed.
/// Adjacency topologies cannot be captured.
fn prim_size(topology: PrimitiveTopology) -> Result<usize, DrawError> {
    if topology.is_adjacency() {
        return Err(DrawError::StreamOutputAdjacency(topology));
    }
    Ok(match topology.reduced(0) {
        crate::topology::ReducedPrim::Points => 1,
        crate::topology::ReducedPrim::Lines => 2,
        crate::topology::ReducedPrim::Triangles => 3,
    })
}

/// Capture `elements` (already decomposed into whole primitives, flat,
/// `prim_size` entries each) from one stream's vertices into the targets.
pub fn capture(
    layout: &SoLayout,
    targets: &mut [SoTarget],
    stream: usize,
    vertices: &VertexBlock,
    elements: &[u32],
    topology: PrimitiveTopology,
    stats: &mut DrawStats,
) -> Result<(), DrawError> {
    let size = prim_size(topology)?;
    let decls: Vec<&SoDeclaration> = layout
        .decls
        .iter()
        .filter(|d| d.stream == stream)
        .collect();
    if decls.is_empty() {
        return Ok(());
    }

    // Floats one vertex consumes in each referenced target.
    let mut per_vertex = [0usize; MAX_SO_TARGETS];
    for d in &decls {
        per_vertex[d.target] = layout.strides[d.target] as usize;
    }

    let mut overflowed = false;
    for prim in elements.chunks_exact(size) {
        let fits = per_vertex
            .iter()
            .enumerate()
            .all(|(t, &pv)| pv == 0 || targets[t].remaining() >= pv * size);
        if !fits {
            stats.so_overflows += 1;
            overflowed = true;
            continue;
        }
        for &e in prim {
            let v = vertices.vertex(e as usize);
            for d in &decls {
                let base = targets[d.target].offset + d.dst_offset;
                let slot = v[d.register];
                let dst = &mut targets[d.target].data[base..base + d.num_components];
                dst.copy_from_slice(&slot[d.start_component..d.start_component + d.num_components]);
            }
            for (t, &pv) in per_vertex.iter().enumerate() {
                if pv != 0 {
                    targets[t].offset += pv;
                }
            }
            stats.so_vertices_written += 1;
        }
    }
    if overflowed {
        warn!(stream, "stream output target full; dropping whole primitives");
    } else {
        debug!(
            stream,
            prims = elements.len() / size,
            "stream output capture"
        );
    }
    Ok(())
}
