//! Primitive-level data model shared by the fixed-function stages: tagged
//! vertices, primitive headers, and decomposition of vertex runs into
//! point/line/triangle events.

use bitflags::bitflags;

use crate::topology::PrimitiveTopology;

bitflags! {
    /// Clip outcode: which planes a vertex lies outside of. Frustum planes
    /// occupy the low six bits; user planes start at bit 6.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ClipMask: u32 {
        const X_POS = 1 << 0;
        const X_NEG = 1 << 1;
        const Y_POS = 1 << 2;
        const Y_NEG = 1 << 3;
        const Z_FAR = 1 << 4;
        const Z_NEAR = 1 << 5;
    }
}

impl ClipMask {
    pub const USER_SHIFT: u32 = 6;

    pub fn user_plane(i: usize) -> Self {
        Self::from_bits_retain(1 << (Self::USER_SHIFT + i as u32))
    }
}

bitflags! {
    /// Per-primitive header flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct PrimFlags: u32 {
        /// Edge between v[0] and v[1] exists in the source geometry.
        const EDGE_0 = 1 << 0;
        /// Edge between v[1] and v[2].
        const EDGE_1 = 1 << 1;
        /// Edge between v[2] and v[0].
        const EDGE_2 = 1 << 2;
        /// Reset the line-stipple counter before this primitive.
        const RESET_STIPPLE = 1 << 3;
    }
}

impl PrimFlags {
    pub fn all_edges() -> Self {
        Self::EDGE_0 | Self::EDGE_1 | Self::EDGE_2
    }
}

bitflags! {
    /// Flags on a whole primitive run (one frontend chunk).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct RunFlags: u32 {
        /// Chunk begins mid-run (carried vertices replayed at its head).
        const SPLIT_BEFORE = 1 << 0;
        /// Chunk ends mid-run; more of the same run follows.
        const SPLIT_AFTER = 1 << 1;
        /// A split line loop: process as a strip, no closing segment.
        const LINELOOP_AS_STRIP = 1 << 2;
    }
}

/// A fully shaded, viewport-transformed vertex flowing through the stage
/// chain. `data[pos_slot]` holds the window-space position; `clip_pos` keeps
/// the pre-divide clip-space position for the geometric clipper.
#[derive(Clone, Debug, PartialEq)]
pub struct PipeVertex {
    /// Stable id: the source vertex index this record was fetched from.
    pub vertex_id: u32,
    pub clipmask: ClipMask,
    pub edgeflag: bool,
    pub viewport_index: u8,
    pub clip_pos: [f32; 4],
    pub data: Vec<[f32; 4]>,
}

/// One primitive in flight between stages.
#[derive(Clone, Debug, PartialEq)]
pub enum PipePrim {
    Point {
        v: Box<PipeVertex>,
        flags: PrimFlags,
    },
    Line {
        v: Box<[PipeVertex; 2]>,
        flags: PrimFlags,
    },
    Tri {
        v: Box<[PipeVertex; 3]>,
        flags: PrimFlags,
        /// 2D signed area from clip-space X/Y, precomputed at pipeline
        /// entry and threaded through so every stage sees the same value.
        det: f32,
    },
}

/// Decomposition event over local vertex indices of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimEvent {
    Point(u32),
    Line { a: u32, b: u32, flags: PrimFlags },
    Tri { a: u32, b: u32, c: u32, flags: PrimFlags },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DecomposeOpts {
    /// Provoking vertex is the first of the primitive; strip/fan orders are
    /// rotated (never swapped, to preserve winding) so v[0] is provoking.
    pub first_provoking: bool,
    pub run_flags: RunFlags,
}

/// Walk `count` vertices of `topology`, emitting one event per primitive in
/// stream order. Adjacency topologies are reduced to their inner primitive
/// (geometry-shader grouping keeps the adjacency vertices and lives in
/// `geometry`, not here). Patch topologies never reach this point.
pub fn decompose(
    topology: PrimitiveTopology,
    count: u32,
    opts: DecomposeOpts,
    emit: &mut impl FnMut(PrimEvent),
) {
    let edges = PrimFlags::all_edges();
    match topology {
        PrimitiveTopology::PointList => {
            for i in 0..count {
                emit(PrimEvent::Point(i));
            }
        }
        PrimitiveTopology::LineList => {
            let mut i = 0;
            while i + 1 < count {
                emit(PrimEvent::Line {
                    a: i,
                    b: i + 1,
                    flags: PrimFlags::RESET_STIPPLE,
                });
                i += 2;
            }
        }
        PrimitiveTopology::LineStrip => {
            for i in 0..count.saturating_sub(1) {
                let flags = if i == 0 && !opts.run_flags.contains(RunFlags::SPLIT_BEFORE) {
                    PrimFlags::RESET_STIPPLE
                } else {
                    PrimFlags::empty()
                };
                emit(PrimEvent::Line { a: i, b: i + 1, flags });
            }
        }
        PrimitiveTopology::LineLoop => {
            if count < 2 {
                return;
            }
            for i in 0..count - 1 {
                let flags = if i == 0 && !opts.run_flags.contains(RunFlags::SPLIT_BEFORE) {
                    PrimFlags::RESET_STIPPLE
                } else {
                    PrimFlags::empty()
                };
                emit(PrimEvent::Line { a: i, b: i + 1, flags });
            }
            if !opts.run_flags.contains(RunFlags::LINELOOP_AS_STRIP)
                && !opts.run_flags.contains(RunFlags::SPLIT_AFTER)
                && count > 2
            {
                emit(PrimEvent::Line {
                    a: count - 1,
                    b: 0,
                    flags: PrimFlags::empty(),
                });
            }
        }
        PrimitiveTopology::TriangleList => {
            let mut i = 0;
            while i + 2 < count {
                emit(PrimEvent::Tri {
                    a: i,
                    b: i + 1,
                    c: i + 2,
                    flags: edges,
                });
                i += 3;
            }
        }
        PrimitiveTopology::TriangleStrip => {
            for i in 0..count.saturating_sub(2) {
                // Odd triangles swap two vertices to keep a consistent
                // winding; the variant chosen keeps the provoking vertex
                // where the convention expects it.
                let (a, b, c) = if i % 2 == 0 {
                    (i, i + 1, i + 2)
                } else if opts.first_provoking {
                    (i, i + 2, i + 1)
                } else {
                    (i + 1, i, i + 2)
                };
                emit(PrimEvent::Tri { a, b, c, flags: edges });
            }
        }
        PrimitiveTopology::TriangleFan => {
            for i in 0..count.saturating_sub(2) {
                // Rotation (winding-preserving) puts the conventional
                // provoking vertex in v[0] under the first-vertex rule.
                let (a, b, c) = if opts.first_provoking {
                    (i + 1, i + 2, 0)
                } else {
                    (0, i + 1, i + 2)
                };
                emit(PrimEvent::Tri { a, b, c, flags: edges });
            }
        }
        PrimitiveTopology::LineListAdjacency => {
            let mut i = 0;
            while i + 3 < count {
                emit(PrimEvent::Line {
                    a: i + 1,
                    b: i + 2,
                    flags: PrimFlags::RESET_STIPPLE,
                });
                i += 4;
            }
        }
        PrimitiveTopology::LineStripAdjacency => {
            if count < 4 {
                return;
            }
            for i in 1..count - 2 {
                let flags = if i == 1 && !opts.run_flags.contains(RunFlags::SPLIT_BEFORE) {
                    PrimFlags::RESET_STIPPLE
                } else {
                    PrimFlags::empty()
                };
                emit(PrimEvent::Line { a: i, b: i + 1, flags });
            }
        }
        PrimitiveTopology::TriangleListAdjacency => {
            let mut i = 0;
            while i + 5 < count {
                emit(PrimEvent::Tri {
                    a: i,
                    b: i + 2,
                    c: i + 4,
                    flags: edges,
                });
                i += 6;
            }
        }
        PrimitiveTopology::TriangleStripAdjacency => {
            if count < 6 {
                return;
            }
            let prims = (count - 4) / 2;
            for p in 0..prims {
                let i = p * 2;
                let (a, b, c) = if p % 2 == 0 {
                    (i, i + 2, i + 4)
                } else if opts.first_provoking {
                    (i, i + 4, i + 2)
                } else {
                    (i + 2, i, i + 4)
                };
                emit(PrimEvent::Tri { a, b, c, flags: edges });
            }
        }
        PrimitiveTopology::Patches => {
            debug_assert!(false, "patch runs must go through the tessellator");
        }
    }
}
