//! Middle-ends: everything between a frontend chunk and the backend sink.
//!
//! Two paths exist. The fast path (plain vertex-shader draws needing
//! neither clip test nor fixed-function stages) shades, viewport-transforms
//! and emits the chunk wholesale. The general path additionally runs
//! tessellation, geometry shading and stream output, then clip-tests the
//! block: trivially accepted draws needing no fixed-function stage are
//! emitted wholesale too, everything else goes through the stage chain one
//! primitive at a time. All paths apply the viewport transform through the
//! same function, so a draw that qualifies for the fast path produces
//! bit-identical positions on any of them.

use crate::backend::RenderSink;
use crate::frontend::{DrawRun, OpsMask, RunElements};
use crate::geometry::run_geometry;
use crate::pipeline::{PipelineParams, PrimPipeline, StageCtx};
use crate::postshade::{build_pipe_vertices, cliptest_block, transform_block, ClipTest};
use crate::prim::{decompose, DecomposeOpts, PrimEvent, RunFlags};
use crate::error::DrawError;
use crate::shader::{Constants, GeometryShader, GsOutputPrim, VertexBlock, VertexShader};
use crate::stream_output::{capture, SoLayout, SoTarget};
use crate::tess::{run_tessellation, Tessellator};
use crate::topology::PrimitiveTopology;
use crate::vertex::{FetchMachine, VertexBuffers};

/// Per-draw immutable inputs shared by both middle-ends.
pub(crate) struct MiddleEnd<'a> {
    pub fetch: &'a FetchMachine,
    pub buffers: &'a VertexBuffers<'a>,
    pub max_index: u32,
    pub constants: &'a Constants<'a>,
    pub vs: Option<&'a dyn VertexShader>,
    pub tess: Option<&'a Tessellator<'a>>,
    pub gs: Option<&'a dyn GeometryShader>,
    pub so: &'a SoLayout,
    pub params: &'a PipelineParams<'a>,
    pub ops: OpsMask,
    pub first_provoking: bool,
    pub patch_vertices: u32,
}

impl MiddleEnd<'_> {
    /// Fetch one chunk; the result holds one vertex per element reference
    /// (shared vertices are refetched, keeping downstream indexing local
    /// and dense).
    fn fetch_chunk(&self, run: &DrawRun, instance_id: u32) -> (VertexBlock, Vec<u32>) {
        let mut block = VertexBlock::new(self.fetch.num_attrs());
        let ids = match &run.elements {
            RunElements::Linear { start, count } => {
                self.fetch
                    .fetch_linear(self.buffers, *start, *count, instance_id, &mut block);
                (*start..start + count).collect()
            }
            RunElements::Indexed(idx) => {
                self.fetch
                    .fetch_indexed(self.buffers, idx, self.max_index, instance_id, &mut block);
                idx.iter()
                    .map(|&raw| if raw >= self.max_index { 0 } else { raw })
                    .collect()
            }
        };
        (block, ids)
    }

    fn shade(&self, fetched: VertexBlock) -> VertexBlock {
        let vs = match self.vs {
            Some(vs) if self.ops.contains(OpsMask::SHADE) => vs,
            _ => return fetched,
        };
        let mut out = VertexBlock::new(vs.info().num_outputs);
        vs.run(&fetched, self.constants, &mut out);
        debug_assert_eq!(out.count(), fetched.count());
        out
    }

    /// The fast path: shade, transform, hand the whole chunk to the sink.
    pub fn run_fast(
        &self,
        run: &DrawRun,
        instance_id: u32,
        sink: &mut dyn RenderSink,
        stats: &mut crate::stats::DrawStats,
    ) {
        let (fetched, _ids) = self.fetch_chunk(run, instance_id);
        let mut shaded = self.shade(fetched);
        transform_block(
            &mut shaded,
            self.params.info,
            self.params.policy,
            self.params.viewports,
        );

        let count = shaded.count();
        let prims = run.topology.prim_count(count as u32, self.patch_vertices) as u64;
        stats.prims_in += prims;

        let slots = self.params.extra.total_slots();
        sink.set_primitive(run.topology);
        if !sink.allocate_vertices(slots * 4, count) {
            tracing::warn!(count, "backend refused vertex allocation; dropping chunk");
            return;
        }
        let mapped = sink.vertices_mut();
        for i in 0..count {
            let dst = &mut mapped[i * slots * 4..];
            for (s, slot) in shaded.vertex(i).iter().enumerate() {
                dst[s * 4..s * 4 + 4].copy_from_slice(slot);
            }
        }
        sink.draw_arrays(0, count as u32);
        sink.release_vertices();
        stats.prims_out += prims;
    }

    /// The general path: tessellation, geometry shading, stream output,
    /// clip test, then the stage chain primitive by primitive.
    pub fn run_general(
        &self,
        run: &DrawRun,
        instance_id: u32,
        pipeline: &mut PrimPipeline,
        so_targets: &mut [SoTarget],
        ctx: &mut StageCtx<'_, '_>,
    ) -> Result<(), DrawError> {
        let (fetched, ids) = self.fetch_chunk(run, instance_id);
        let mut block = self.shade(fetched);
        let mut topology = run.topology;
        let mut elements: Vec<u32> = (0..block.count() as u32).collect();
        let mut ids = ids;
        let mut flags = run.flags;

        if let Some(t) = self.tess {
            let tr = run_tessellation(t, &block, &elements, self.constants)?;
            topology = tr.topology;
            block = tr.vertices;
            elements = tr.indices;
            ids = (0..block.count() as u32).collect();
            flags = RunFlags::empty();
        }

        if let Some(gs) = self.gs {
            let gs_run = run_geometry(gs, &block, &elements, topology, self.constants, ctx.stats)?;
            if self.so.is_active() {
                for (s, stream) in gs_run.streams.iter().enumerate() {
                    if self.so.stream_mask() & (1 << s) == 0 {
                        continue;
                    }
                    let strip_topology = gs_topology(stream.topology);
                    let mut flat = Vec::new();
                    for i in 0..stream.strip_lengths.len() {
                        let range = stream.strip(i);
                        decompose_to_list(strip_topology, range, &mut flat);
                    }
                    capture(
                        self.so,
                        so_targets,
                        s,
                        &stream.vertices,
                        &flat,
                        strip_topology,
                        ctx.stats,
                    )?;
                }
            }
            let primary = gs_run.primary();
            let strip_topology = gs_topology(primary.topology);
            let ids: Vec<u32> = (0..primary.vertices.count() as u32).collect();
            for i in 0..primary.strip_lengths.len() {
                let range = primary.strip(i);
                let strip_elements: Vec<u32> = (range.start as u32..range.end as u32).collect();
                self.feed_pipeline(
                    &primary.vertices,
                    &ids,
                    &strip_elements,
                    strip_topology,
                    RunFlags::empty(),
                    pipeline,
                    ctx,
                );
            }
            return Ok(());
        }

        if self.so.is_active() && self.so.stream_mask() & 1 != 0 {
            let mut flat = Vec::new();
            let opts = DecomposeOpts {
                first_provoking: self.first_provoking,
                run_flags: flags,
            };
            decompose(topology, elements.len() as u32, opts, &mut |ev| match ev {
                PrimEvent::Point(a) => flat.push(elements[a as usize]),
                PrimEvent::Line { a, b, .. } => {
                    flat.extend([elements[a as usize], elements[b as usize]])
                }
                PrimEvent::Tri { a, b, c, .. } => flat.extend([
                    elements[a as usize],
                    elements[b as usize],
                    elements[c as usize],
                ]),
            });
            capture(self.so, so_targets, 0, &block, &flat, topology, ctx.stats)?;
        }

        if !self.ops.contains(OpsMask::PIPELINE)
            && self.trivial_accept(&mut block, &elements, topology, ctx)
        {
            return Ok(());
        }
        self.feed_pipeline(&block, &ids, &elements, topology, flags, pipeline, ctx);
        Ok(())
    }

    /// The per-draw pipeline routing decision for clip-test-only draws:
    /// clip-test the whole block once, and when no vertex fails the
    /// (guard-banded) test, transform and emit it wholesale with topology
    /// and element list intact. The stage chain is never entered.
    fn trivial_accept(
        &self,
        block: &mut VertexBlock,
        elements: &[u32],
        topology: PrimitiveTopology,
        ctx: &mut StageCtx<'_, '_>,
    ) -> bool {
        // Blocks past u16 addressing go through the chain, which splits.
        if block.count() > u16::MAX as usize {
            return false;
        }
        let p = self.params;
        let test = ClipTest {
            policy: p.policy,
            rast: p.rast,
            planes: p.planes,
            info: p.info,
        };
        if cliptest_block(block, &test, topology.reduced(self.patch_vertices)) {
            return false;
        }
        transform_block(block, p.info, p.policy, p.viewports);
        let prims = topology.prim_count(elements.len() as u32, self.patch_vertices) as u64;
        ctx.stats.prims_in += prims;
        ctx.stats.prims_out += prims;
        ctx.emit.block(block, elements, topology);
        true
    }

    /// Clip-test a block and push its primitives into the stage chain.
    pub(crate) fn feed_pipeline(
        &self,
        block: &VertexBlock,
        ids: &[u32],
        elements: &[u32],
        topology: PrimitiveTopology,
        flags: RunFlags,
        pipeline: &mut PrimPipeline,
        ctx: &mut StageCtx<'_, '_>,
    ) {
        let p = self.params;
        let test = ClipTest {
            policy: p.policy,
            rast: p.rast,
            planes: p.planes,
            info: p.info,
        };
        let verts = build_pipe_vertices(
            block,
            ids,
            &test,
            topology.reduced(self.patch_vertices),
            p.policy,
            p.viewports,
            p.extra.total_slots(),
        );

        let opts = DecomposeOpts {
            first_provoking: self.first_provoking,
            run_flags: flags,
        };
        decompose(topology, elements.len() as u32, opts, &mut |ev| {
            ctx.stats.prims_in += 1;
            match ev {
                PrimEvent::Point(a) => {
                    let v = verts[elements[a as usize] as usize].clone();
                    pipeline.point(ctx, v, crate::prim::PrimFlags::empty());
                }
                PrimEvent::Line { a, b, flags } => {
                    let va = verts[elements[a as usize] as usize].clone();
                    let vb = verts[elements[b as usize] as usize].clone();
                    pipeline.line(ctx, [va, vb], flags);
                }
                PrimEvent::Tri { a, b, c, flags } => {
                    let va = verts[elements[a as usize] as usize].clone();
                    let vb = verts[elements[b as usize] as usize].clone();
                    let vc = verts[elements[c as usize] as usize].clone();
                    pipeline.tri(ctx, [va, vb, vc], flags);
                }
            }
        });
    }
}

fn gs_topology(out: GsOutputPrim) -> PrimitiveTopology {
    match out {
        GsOutputPrim::Points => PrimitiveTopology::PointList,
        GsOutputPrim::LineStrip => PrimitiveTopology::LineStrip,
        GsOutputPrim::TriangleStrip => PrimitiveTopology::TriangleStrip,
    }
}

/// Decompose a consecutive vertex range of `topology` into a flat list of
/// whole-primitive vertex indices.
fn decompose_to_list(
    topology: PrimitiveTopology,
    range: std::ops::Range<usize>,
    out: &mut Vec<u32>,
) {
    let base = range.start as u32;
    let count = (range.end - range.start) as u32;
    decompose(topology, count, DecomposeOpts::default(), &mut |ev| match ev {
        PrimEvent::Point(a) => out.push(base + a),
        PrimEvent::Line { a, b, .. } => out.extend([base + a, base + b]),
        PrimEvent::Tri { a, b, c, .. } => out.extend([base + a, base + b, base + c]),
    });
}
