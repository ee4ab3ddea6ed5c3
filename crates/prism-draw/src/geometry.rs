//! Geometry-shader adapter: groups upstream vertices into GS input
//! primitives (including adjacency groupings), invokes the executor once
//! per primitive per invocation, and collects the emitted streams.
//!
//! Output arrives as per-stream vertex blocks plus strip lengths; the
//! middle-end replays stream 0 into post-shade processing and hands every
//! stream to stream output.

use tracing::debug;

use crate::error::DrawError;
use crate::shader::{
    Constants, GeometryShader, GsEmit, GsInputPrim, GsOutputPrim, VertexBlock, MAX_VERTEX_STREAMS,
};
use crate::stats::DrawStats;
use crate::topology::PrimitiveTopology;

/// One collected GS output stream: vertices plus the length of each emitted
/// strip/run. Runs shorter than the output topology's minimum are dropped
/// at collection time.
#[derive(Clone, Debug)]
pub struct GsStream {
    pub topology: GsOutputPrim,
    pub vertices: VertexBlock,
    pub strip_lengths: Vec<u32>,
}

impl GsStream {
    fn new(topology: GsOutputPrim, num_slots: usize) -> Self {
        Self {
            topology,
            vertices: VertexBlock::new(num_slots),
            strip_lengths: Vec::new(),
        }
    }

    /// Vertices of strip `s`, as a range into `vertices`.
    pub fn strip(&self, s: usize) -> std::ops::Range<usize> {
        let start: u32 = self.strip_lengths[..s].iter().sum();
        start as usize..(start + self.strip_lengths[s]) as usize
    }
}

/// Result of running the geometry shader over one fetched batch.
#[derive(Clone, Debug)]
pub struct GsRun {
    pub streams: Vec<GsStream>,
}

impl GsRun {
    pub fn primary(&self) -> &GsStream {
        &self.streams[0]
    }
}

struct StreamCollector {
    streams: Vec<GsStream>,
    /// Vertices still open in the current strip, per stream.
    open: Vec<u32>,
    /// Total vertices emitted this invocation (all streams), capped.
    emitted: usize,
    max_vertices: usize,
}

impl StreamCollector {
    fn new(gs: &dyn GeometryShader) -> Self {
        let num_streams = gs.num_streams();
        let topology = gs.output_topology();
        let slots = gs.info().num_outputs;
        Self {
            streams: (0..num_streams)
                .map(|_| GsStream::new(topology, slots))
                .collect(),
            open: vec![0; num_streams],
            emitted: 0,
            max_vertices: gs.max_output_vertices(),
        }
    }

    fn min_run(&self) -> u32 {
        match self.streams[0].topology {
            GsOutputPrim::Points => 1,
            GsOutputPrim::LineStrip => 2,
            GsOutputPrim::TriangleStrip => 3,
        }
    }

    fn close(&mut self, stream: usize) {
        let len = self.open[stream];
        self.open[stream] = 0;
        if len == 0 {
            return;
        }
        if len < self.min_run() {
            // Incomplete strip: discard the dangling vertices.
            let s = &mut self.streams[stream];
            let keep = s.vertices.count() - len as usize;
            s.vertices.truncate(keep);
            return;
        }
        self.streams[stream].strip_lengths.push(len);
    }

    fn end_invocation(&mut self) {
        for s in 0..self.streams.len() {
            self.close(s);
        }
        self.emitted = 0;
    }
}

impl GsEmit for StreamCollector {
    fn emit_vertex(&mut self, stream: usize, slots: &[[f32; 4]]) {
        if stream >= self.streams.len() || self.emitted >= self.max_vertices {
            return;
        }
        self.emitted += 1;
        self.open[stream] += 1;
        self.streams[stream].vertices.push(slots);
    }

    fn end_primitive(&mut self, stream: usize) {
        if stream < self.streams.len() {
            self.close(stream);
        }
    }
}

/// Append the GS input groups for `topology` over `count` vertices to
/// `groups`, flat, `expected.vertex_count()` entries per group. Trailing
/// vertices that do not complete a group are ignored.
fn gather_groups(topology: PrimitiveTopology, count: usize, expected: GsInputPrim) -> Vec<u32> {
    let n = count as u32;
    let mut out = Vec::new();
    match expected {
        GsInputPrim::Points => out.extend(0..n),
        GsInputPrim::Lines => match topology {
            PrimitiveTopology::LineStrip => {
                for i in 0..n.saturating_sub(1) {
                    out.extend([i, i + 1]);
                }
            }
            PrimitiveTopology::LineLoop => {
                for i in 0..n.saturating_sub(1) {
                    out.extend([i, i + 1]);
                }
                if n >= 2 {
                    out.extend([n - 1, 0]);
                }
            }
            _ => {
                for i in (0..n.saturating_sub(1)).step_by(2) {
                    out.extend([i, i + 1]);
                }
            }
        },
        GsInputPrim::Triangles => match topology {
            PrimitiveTopology::TriangleStrip => {
                for i in 0..n.saturating_sub(2) {
                    // Odd triangles swap to preserve winding.
                    if i % 2 == 0 {
                        out.extend([i, i + 1, i + 2]);
                    } else {
                        out.extend([i + 1, i, i + 2]);
                    }
                }
            }
            PrimitiveTopology::TriangleFan => {
                for i in 0..n.saturating_sub(2) {
                    out.extend([0, i + 1, i + 2]);
                }
            }
            _ => {
                for i in (0..n.saturating_sub(2)).step_by(3) {
                    out.extend([i, i + 1, i + 2]);
                }
            }
        },
        GsInputPrim::LinesAdjacency => match topology {
            PrimitiveTopology::LineStripAdjacency => {
                for i in 0..n.saturating_sub(3) {
                    out.extend([i, i + 1, i + 2, i + 3]);
                }
            }
            _ => {
                for i in (0..n.saturating_sub(3)).step_by(4) {
                    out.extend([i, i + 1, i + 2, i + 3]);
                }
            }
        },
        GsInputPrim::TrianglesAdjacency => match topology {
            PrimitiveTopology::TriangleStripAdjacency => {
                if n >= 6 {
                    let prims = (n - 4) / 2;
                    for j in 0..prims {
                        let last = j == prims - 1;
                        let b = 2 * j;
                        if j % 2 == 0 {
                            out.extend([
                                b,
                                if j == 0 { 1 } else { b - 2 },
                                b + 2,
                                if last { b + 5 } else { b + 6 },
                                b + 4,
                                b + 3,
                            ]);
                        } else {
                            out.extend([
                                b + 2,
                                b - 2,
                                b,
                                b + 3,
                                b + 4,
                                if last { b + 5 } else { b + 6 },
                            ]);
                        }
                    }
                }
            }
            _ => {
                for i in (0..n.saturating_sub(5)).step_by(6) {
                    out.extend([i, i + 1, i + 2, i + 3, i + 4, i + 5]);
                }
            }
        },
    }
    out
}

/// Run the geometry shader over a shaded batch and collect its streams.
///
/// `elements[i]` maps batch position `i` to a vertex in `input`; linear
/// draws pass the identity. The executor sees one invocation per input
/// primitive per declared invocation index.
pub fn run_geometry(
    gs: &dyn GeometryShader,
    input: &VertexBlock,
    elements: &[u32],
    topology: PrimitiveTopology,
    constants: &Constants<'_>,
    stats: &mut DrawStats,
) -> Result<GsRun, DrawError> {
    if gs.max_output_vertices() == 0 {
        return Err(DrawError::EmptyGeometryShader);
    }
    let num_streams = gs.num_streams();
    if num_streams == 0 || num_streams > MAX_VERTEX_STREAMS {
        return Err(DrawError::TooManyStreams(num_streams, MAX_VERTEX_STREAMS));
    }

    let expected = gs.input_topology();
    let group_size = expected.vertex_count();
    let groups = gather_groups(topology, elements.len(), expected);
    debug!(
        prims = groups.len() / group_size,
        invocations = gs.invocations(),
        "geometry shader dispatch"
    );

    let mut collector = StreamCollector::new(gs);
    let mut refs: Vec<&[[f32; 4]]> = Vec::with_capacity(group_size);
    for (prim_id, group) in groups.chunks_exact(group_size).enumerate() {
        for invocation in 0..gs.invocations() {
            refs.clear();
            for &g in group {
                refs.push(input.vertex(elements[g as usize] as usize));
            }
            gs.run(&refs, prim_id as u32, invocation, constants, &mut collector);
            collector.end_invocation();
            stats.gs_invocations += 1;
        }
    }
    Ok(GsRun {
        streams: collector.streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderInfo;

    struct PassthroughGs {
        info: ShaderInfo,
        input: GsInputPrim,
        output: GsOutputPrim,
    }

    impl GeometryShader for PassthroughGs {
        fn info(&self) -> &ShaderInfo {
            &self.info
        }
        fn input_topology(&self) -> GsInputPrim {
            self.input
        }
        fn output_topology(&self) -> GsOutputPrim {
            self.output
        }
        fn max_output_vertices(&self) -> usize {
            16
        }
        fn run(
            &self,
            input: &[&[[f32; 4]]],
            _primitive_id: u32,
            _invocation: u32,
            _constants: &Constants<'_>,
            out: &mut dyn GsEmit,
        ) {
            for v in input {
                out.emit_vertex(0, v);
            }
            out.end_primitive(0);
        }
    }

    fn block_of(count: usize) -> VertexBlock {
        let mut b = VertexBlock::new(1);
        for i in 0..count {
            b.push(&[[i as f32, 0.0, 0.0, 1.0]]);
        }
        b
    }

    #[test]
    fn triangle_strip_groups_preserve_winding() {
        let groups = gather_groups(PrimitiveTopology::TriangleStrip, 5, GsInputPrim::Triangles);
        assert_eq!(groups, vec![0, 1, 2, 2, 1, 3, 2, 3, 4]);
    }

    #[test]
    fn strip_adjacency_single_primitive() {
        let groups = gather_groups(
            PrimitiveTopology::TriangleStripAdjacency,
            6,
            GsInputPrim::TrianglesAdjacency,
        );
        assert_eq!(groups, vec![0, 1, 2, 5, 4, 3]);
    }

    #[test]
    fn passthrough_gs_replays_triangles() {
        let gs = PassthroughGs {
            info: ShaderInfo::simple(1),
            input: GsInputPrim::Triangles,
            output: GsOutputPrim::TriangleStrip,
        };
        let block = block_of(6);
        let elements: Vec<u32> = (0..6).collect();
        let mut stats = DrawStats::default();
        let run = run_geometry(
            &gs,
            &block,
            &elements,
            PrimitiveTopology::TriangleList,
            &Constants::default(),
            &mut stats,
        )
        .unwrap();
        let s = run.primary();
        assert_eq!(s.strip_lengths, vec![3, 3]);
        assert_eq!(s.vertices.count(), 6);
        assert_eq!(stats.gs_invocations, 2);
    }

    #[test]
    fn incomplete_strip_is_discarded() {
        struct ShortGs(ShaderInfo);
        impl GeometryShader for ShortGs {
            fn info(&self) -> &ShaderInfo {
                &self.0
            }
            fn input_topology(&self) -> GsInputPrim {
                GsInputPrim::Points
            }
            fn output_topology(&self) -> GsOutputPrim {
                GsOutputPrim::TriangleStrip
            }
            fn max_output_vertices(&self) -> usize {
                4
            }
            fn run(
                &self,
                _input: &[&[[f32; 4]]],
                _primitive_id: u32,
                _invocation: u32,
                _constants: &Constants<'_>,
                out: &mut dyn GsEmit,
            ) {
                // Two vertices cannot form a triangle strip.
                out.emit_vertex(0, &[[0.0; 4]]);
                out.emit_vertex(0, &[[0.0; 4]]);
            }
        }
        let gs = ShortGs(ShaderInfo::simple(1));
        let block = block_of(1);
        let mut stats = DrawStats::default();
        let run = run_geometry(
            &gs,
            &block,
            &[0],
            PrimitiveTopology::PointList,
            &Constants::default(),
            &mut stats,
        )
        .unwrap();
        assert!(run.primary().strip_lengths.is_empty());
        assert_eq!(run.primary().vertices.count(), 0);
    }
}
