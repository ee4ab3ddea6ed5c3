//! Draw-call frontend: classifies each draw into a capability mask,
//! resolves index buffers (restart re-chunking, index bias), and splits
//! long runs into bounded chunks with carry-vertex replay.

use bitflags::bitflags;

use crate::prim::RunFlags;
use crate::topology::PrimitiveTopology;

bitflags! {
    /// What processing a draw needs; the middle-end is picked from this.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct OpsMask: u32 {
        /// Run the bound shader stages.
        const SHADE = 1 << 0;
        /// Compute per-vertex clip outcodes and route clipped draws through
        /// the geometric clipper.
        const CLIPTEST = 1 << 1;
        /// The fixed-function stage chain is non-trivial for this state.
        const PIPELINE = 1 << 2;
    }
}

/// Largest number of vertex references fetched per chunk. Chosen so one
/// chunk's shaded block stays cache-friendly and chunk element lists stay
/// far below the u16 emission limit.
pub const SPLIT_MAX: u32 = 4096;

/// Index buffer view, by element width.
#[derive(Clone, Copy, Debug)]
pub enum IndexSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(s) => s.len(),
            Self::U16(s) => s.len(),
            Self::U32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> u32 {
        match self {
            Self::U8(s) => s[i] as u32,
            Self::U16(s) => s[i] as u32,
            Self::U32(s) => s[i],
        }
    }
}

/// One draw call as submitted.
#[derive(Clone, Copy, Debug)]
pub struct DrawInfo<'a> {
    pub topology: PrimitiveTopology,
    pub indices: Option<IndexSlice<'a>>,
    /// Index value that cuts the current run (indexed draws only).
    pub restart_index: Option<u32>,
    /// Added to every fetched index (indexed draws only); results clamp
    /// at zero.
    pub index_bias: i32,
    pub instance_count: u32,
}

impl Default for DrawInfo<'_> {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::PointList,
            indices: None,
            restart_index: None,
            index_bias: 0,
            instance_count: 1,
        }
    }
}

/// One start/count range within a draw (multi-draw submits several).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRange {
    pub start: u32,
    pub count: u32,
}

/// Vertex references of one chunk. Linear runs stay linear until a split
/// forces an explicit list (fan pivots, loop closure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunElements {
    Linear { start: u32, count: u32 },
    Indexed(Vec<u32>),
}

impl RunElements {
    pub fn len(&self) -> usize {
        match self {
            Self::Linear { count, .. } => *count as usize,
            Self::Indexed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize as a flat list.
    pub fn to_list(&self) -> Vec<u32> {
        match self {
            Self::Linear { start, count } => (*start..start + count).collect(),
            Self::Indexed(v) => v.clone(),
        }
    }
}

/// One bounded chunk handed to a middle-end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawRun {
    pub topology: PrimitiveTopology,
    pub elements: RunElements,
    pub flags: RunFlags,
}

enum RunView {
    Linear { start: u32, count: u32 },
    List(Vec<u32>),
}

impl RunView {
    fn len(&self) -> u32 {
        match self {
            Self::Linear { count, .. } => *count,
            Self::List(v) => v.len() as u32,
        }
    }

    fn at(&self, i: u32) -> u32 {
        match self {
            Self::Linear { start, .. } => start + i,
            Self::List(v) => v[i as usize],
        }
    }

    fn slice(&self, from: u32, len: u32) -> RunElements {
        match self {
            Self::Linear { start, .. } => RunElements::Linear {
                start: start + from,
                count: len,
            },
            Self::List(v) => RunElements::Indexed(v[from as usize..(from + len) as usize].to_vec()),
        }
    }
}

/// Per-chunk advance for a split run: the chunk body size, aligned so
/// primitive grouping and strip parity survive the boundary.
fn chunk_step(topology: PrimitiveTopology, patch_vertices: u32, carry: u32) -> u32 {
    let raw = SPLIT_MAX - carry;
    let align = match topology {
        PrimitiveTopology::LineList => 2,
        PrimitiveTopology::TriangleList => 3,
        PrimitiveTopology::LineListAdjacency => 4,
        PrimitiveTopology::TriangleListAdjacency => 6,
        // Strip parity: an odd split would flip winding downstream.
        PrimitiveTopology::TriangleStrip | PrimitiveTopology::TriangleStripAdjacency => 2,
        PrimitiveTopology::Patches => patch_vertices.max(1),
        _ => 1,
    };
    (raw / align).max(1) * align
}

fn split_view(
    topology: PrimitiveTopology,
    patch_vertices: u32,
    view: RunView,
    base_flags: RunFlags,
    out: &mut Vec<DrawRun>,
) {
    let count = topology.trim(view.len(), patch_vertices);
    if count == 0 {
        return;
    }
    if count <= SPLIT_MAX {
        out.push(DrawRun {
            topology,
            elements: view.slice(0, count),
            flags: base_flags,
        });
        return;
    }

    if topology == PrimitiveTopology::LineLoop {
        // A split loop is processed as strips; the closing segment comes
        // from replaying the first vertex at the very end.
        let mut closed: Vec<u32> = (0..count).map(|i| view.at(i)).collect();
        closed.push(view.at(0));
        return split_view(
            PrimitiveTopology::LineStrip,
            patch_vertices,
            RunView::List(closed),
            base_flags | RunFlags::LINELOOP_AS_STRIP,
            out,
        );
    }

    let carry = topology.carry_count(patch_vertices);
    let fan = topology == PrimitiveTopology::TriangleFan;
    let step = chunk_step(topology, patch_vertices, carry + fan as u32);

    let mut pos = 0u32;
    while pos < count {
        let first = pos == 0;
        let body = step.min(count - pos);
        let last = pos + body >= count;
        let elements = if first {
            view.slice(0, body)
        } else if fan {
            // Replay the pivot ahead of the carry vertex.
            let mut list = Vec::with_capacity((1 + carry + body) as usize);
            list.push(view.at(0));
            for i in pos - carry..pos + body {
                list.push(view.at(i));
            }
            RunElements::Indexed(list)
        } else {
            view.slice(pos - carry, carry + body)
        };
        let mut flags = base_flags;
        if !first {
            flags |= RunFlags::SPLIT_BEFORE;
        }
        if !last {
            flags |= RunFlags::SPLIT_AFTER;
        }
        out.push(DrawRun {
            topology,
            elements,
            flags,
        });
        pos += body;
    }
}

/// Break one submitted range into middle-end chunks.
///
/// Indexed draws are resolved here: restart values cut the run into
/// independent sub-runs (each trimmed to whole primitives on its own), and
/// the index bias is folded into every element. The middle-end clamps
/// out-of-range elements during fetch; this layer does not.
pub fn build_runs(
    info: &DrawInfo<'_>,
    range: DrawRange,
    patch_vertices: u32,
) -> Vec<DrawRun> {
    let mut out = Vec::new();
    match info.indices {
        None => {
            split_view(
                info.topology,
                patch_vertices,
                RunView::Linear {
                    start: range.start,
                    count: range.count,
                },
                RunFlags::empty(),
                &mut out,
            );
        }
        Some(indices) => {
            let end = (range.start as usize + range.count as usize).min(indices.len());
            let start = (range.start as usize).min(end);
            let bias = info.index_bias as i64;
            let mut run: Vec<u32> = Vec::new();
            for i in start..end {
                let raw = indices.get(i);
                if info.restart_index == Some(raw) {
                    split_view(
                        info.topology,
                        patch_vertices,
                        RunView::List(std::mem::take(&mut run)),
                        RunFlags::empty(),
                        &mut out,
                    );
                    continue;
                }
                run.push((raw as i64 + bias).max(0) as u32);
            }
            split_view(
                info.topology,
                patch_vertices,
                RunView::List(run),
                RunFlags::empty(),
                &mut out,
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_linear_draw_is_one_run() {
        let info = DrawInfo {
            topology: PrimitiveTopology::TriangleList,
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 3, count: 7 }, 0);
        assert_eq!(runs.len(), 1);
        // Trailing partial triangle trimmed.
        assert_eq!(
            runs[0].elements,
            RunElements::Linear { start: 3, count: 6 }
        );
    }

    #[test]
    fn restart_cuts_and_retrims() {
        let idx: Vec<u32> = vec![0, 1, 2, 3, u32::MAX, 4, 5, 6];
        let info = DrawInfo {
            topology: PrimitiveTopology::TriangleStrip,
            indices: Some(IndexSlice::U32(&idx)),
            restart_index: Some(u32::MAX),
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 0, count: 8 }, 0);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].elements, RunElements::Indexed(vec![0, 1, 2, 3]));
        assert_eq!(runs[1].elements, RunElements::Indexed(vec![4, 5, 6]));
    }

    #[test]
    fn restart_sub_run_too_short_is_dropped() {
        let idx: Vec<u16> = vec![0, 1, u16::MAX, 2, 3, 4];
        let info = DrawInfo {
            topology: PrimitiveTopology::TriangleList,
            indices: Some(IndexSlice::U16(&idx)),
            restart_index: Some(u16::MAX as u32),
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 0, count: 6 }, 0);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].elements, RunElements::Indexed(vec![2, 3, 4]));
    }

    #[test]
    fn index_bias_clamps_at_zero() {
        let idx: Vec<u16> = vec![0, 5, 9];
        let info = DrawInfo {
            topology: PrimitiveTopology::PointList,
            indices: Some(IndexSlice::U16(&idx)),
            index_bias: -4,
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 0, count: 3 }, 0);
        assert_eq!(runs[0].elements, RunElements::Indexed(vec![0, 1, 5]));
    }

    #[test]
    fn long_strip_splits_with_carry() {
        let count = SPLIT_MAX * 2 + 100;
        let info = DrawInfo {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 0, count }, 0);
        assert!(runs.len() > 1);
        // No primitive lost across the boundaries.
        let prims: u32 = runs
            .iter()
            .map(|r| {
                PrimitiveTopology::TriangleStrip.prim_count(r.elements.len() as u32, 0)
            })
            .sum();
        assert_eq!(prims, count - 2);
        assert!(runs[0].flags.contains(RunFlags::SPLIT_AFTER));
        assert!(runs[1].flags.contains(RunFlags::SPLIT_BEFORE));
        // Chunks stay bounded.
        for r in &runs {
            assert!(r.elements.len() as u32 <= SPLIT_MAX);
        }
    }

    #[test]
    fn split_fan_replays_pivot() {
        let count = SPLIT_MAX + 10;
        let info = DrawInfo {
            topology: PrimitiveTopology::TriangleFan,
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 100, count }, 0);
        assert!(runs.len() >= 2);
        match &runs[1].elements {
            RunElements::Indexed(v) => {
                assert_eq!(v[0], 100);
                // Carry vertex follows the pivot.
                assert_eq!(v[1], 100 + runs[0].elements.len() as u32 - 1);
            }
            other => panic!("expected indexed chunk, got {other:?}"),
        }
        let prims: u32 = runs
            .iter()
            .map(|r| PrimitiveTopology::TriangleFan.prim_count(r.elements.len() as u32, 0))
            .sum();
        assert_eq!(prims, count - 2);
    }

    #[test]
    fn split_loop_closes_via_replay() {
        let count = SPLIT_MAX + 5;
        let info = DrawInfo {
            topology: PrimitiveTopology::LineLoop,
            ..Default::default()
        };
        let runs = build_runs(&info, DrawRange { start: 0, count }, 0);
        assert!(runs.len() >= 2);
        for r in &runs {
            assert_eq!(r.topology, PrimitiveTopology::LineStrip);
            assert!(r.flags.contains(RunFlags::LINELOOP_AS_STRIP));
        }
        let last = runs.last().unwrap();
        match &last.elements {
            RunElements::Indexed(v) => assert_eq!(*v.last().unwrap(), 0),
            RunElements::Linear { .. } => panic!("closure needs an explicit list"),
        }
        // Strip segments across all chunks equal the loop's prim count.
        let prims: u32 = runs
            .iter()
            .map(|r| PrimitiveTopology::LineStrip.prim_count(r.elements.len() as u32, 0))
            .sum();
        assert_eq!(prims, count);
    }

    #[test]
    fn patches_split_on_patch_boundaries() {
        let info = DrawInfo {
            topology: PrimitiveTopology::Patches,
            ..Default::default()
        };
        let runs = build_runs(
            &info,
            DrawRange {
                start: 0,
                count: SPLIT_MAX + 50,
            },
            16,
        );
        for r in &runs {
            assert_eq!(r.elements.len() % 16, 0);
        }
    }
}
