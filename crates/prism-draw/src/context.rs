//! The draw context: owns bound shaders and state snapshots, caches the
//! prepared stage chain, and dispatches submitted draws to a middle-end.
//!
//! Error policy: configuration mistakes (bad slot references, too many
//! planes, unbound shaders) surface as [`DrawError`] from the setter or the
//! draw call. Everything data-dependent degrades instead — out-of-range
//! indices clamp, overflowing buffers drop whole primitives with a warning,
//! failed driver binds fall back to passthrough.

use tracing::debug;

use crate::backend::RenderSink;
use crate::error::DrawError;
use crate::extra::{ExtraSemantic, ExtraSlots, ExtraSlotsBuilder};
use crate::frontend::{build_runs, DrawInfo, DrawRange, OpsMask};
use crate::middle::MiddleEnd;
use crate::pipeline::{
    build_chain, need_pipeline, ChainState, DriverHooks, NullHooks, PipeEmitter, PipelineParams,
    PrimPipeline, StageCtx, StageInstalls,
};
use crate::prim::RunFlags;
use crate::shader::{
    Constants, FragmentInfo, GeometryShader, MeshShader, ShaderInfo, TessCtrlShader,
    TessEvalShader, VertexShader, MAX_VERTEX_STREAMS,
};
use crate::state::{
    ClipPolicy, PipelineCaps, Rasterizer, UserClipPlanes, VertexElement, Viewport,
    MAX_USER_CLIP_PLANES, MAX_VIEWPORTS,
};
use crate::stats::DrawStats;
use crate::stream_output::{SoLayout, SoTarget};
use crate::tess::Tessellator;
use crate::topology::PrimitiveTopology;
use crate::vertex::{FetchMachine, VertexBuffers};

/// Why the context is being flushed; carried for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    /// A draw parameter changed under pending work.
    ParameterChange,
    /// A state change requires earlier work to land first.
    StateChange,
    /// The backend asked for its pending work.
    BackendFlush,
}

/// State derived at prepare time and reused until invalidated.
struct Prepared {
    info: ShaderInfo,
    extra: ExtraSlots,
    pipeline: PrimPipeline,
}

/// The top-level object: bind state and shaders, then submit draws against
/// a [`RenderSink`]. Single-threaded by contract.
pub struct DrawContext {
    vs: Option<Box<dyn VertexShader>>,
    gs: Option<Box<dyn GeometryShader>>,
    tcs: Option<Box<dyn TessCtrlShader>>,
    tes: Option<Box<dyn TessEvalShader>>,
    mesh: Option<Box<dyn MeshShader>>,
    frag: FragmentInfo,

    rast: Rasterizer,
    caps: PipelineCaps,
    policy: ClipPolicy,
    planes: UserClipPlanes,
    viewports: Vec<Viewport>,
    poly_stipple: [u32; 32],

    patch_vertices: u32,
    default_outer: [f32; 4],
    default_inner: [f32; 2],

    fetch: FetchMachine,

    so_layout: SoLayout,
    so_targets: Vec<SoTarget>,

    installs: StageInstalls,
    hooks: Box<dyn DriverHooks>,

    stats: DrawStats,
    prepared: Option<Prepared>,
    in_draw: bool,
}

impl Default for DrawContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawContext {
    pub fn new() -> Self {
        Self {
            vs: None,
            gs: None,
            tcs: None,
            tes: None,
            mesh: None,
            frag: FragmentInfo::default(),
            rast: Rasterizer::default(),
            caps: PipelineCaps::default(),
            policy: ClipPolicy::default(),
            planes: UserClipPlanes::default(),
            viewports: vec![Viewport::default()],
            poly_stipple: [u32::MAX; 32],
            patch_vertices: 0,
            default_outer: [1.0; 4],
            default_inner: [1.0; 2],
            fetch: FetchMachine::new(&[], 0).expect("empty element table"),
            so_layout: SoLayout::default(),
            so_targets: Vec::new(),
            installs: StageInstalls::default(),
            hooks: Box::new(NullHooks),
            stats: DrawStats::default(),
            prepared: None,
            in_draw: false,
        }
    }

    fn invalidate(&mut self) {
        self.prepared = None;
    }

    // State setters. Each invalidates the prepared chain; validation that
    // needs the full picture (shader info vs. stream output, for one) waits
    // until prepare.

    pub fn bind_vertex_shader(&mut self, vs: Box<dyn VertexShader>) -> Result<(), DrawError> {
        vs.info().validate()?;
        self.vs = Some(vs);
        self.invalidate();
        Ok(())
    }

    pub fn bind_geometry_shader(
        &mut self,
        gs: Option<Box<dyn GeometryShader>>,
    ) -> Result<(), DrawError> {
        if let Some(gs) = &gs {
            gs.info().validate()?;
            if gs.max_output_vertices() == 0 {
                return Err(DrawError::EmptyGeometryShader);
            }
            let streams = gs.num_streams();
            if streams == 0 || streams > MAX_VERTEX_STREAMS {
                return Err(DrawError::TooManyStreams(streams, MAX_VERTEX_STREAMS));
            }
        }
        self.gs = gs;
        self.invalidate();
        Ok(())
    }

    pub fn bind_tess_shaders(
        &mut self,
        tcs: Option<Box<dyn TessCtrlShader>>,
        tes: Option<Box<dyn TessEvalShader>>,
    ) -> Result<(), DrawError> {
        if let Some(tcs) = &tcs {
            tcs.info().validate()?;
            if tcs.output_patch_vertices() == 0 {
                return Err(DrawError::EmptyPatch);
            }
        }
        if let Some(tes) = &tes {
            tes.info().validate()?;
        }
        self.tcs = tcs;
        self.tes = tes;
        self.invalidate();
        Ok(())
    }

    pub fn bind_mesh_shader(&mut self, mesh: Option<Box<dyn MeshShader>>) -> Result<(), DrawError> {
        if let Some(mesh) = &mesh {
            mesh.info().validate()?;
        }
        self.mesh = mesh;
        self.invalidate();
        Ok(())
    }

    pub fn set_fragment_info(&mut self, frag: FragmentInfo) {
        self.frag = frag;
        self.invalidate();
    }

    pub fn set_rasterizer(&mut self, rast: Rasterizer) {
        self.rast = rast;
        self.invalidate();
    }

    pub fn set_pipeline_caps(&mut self, caps: PipelineCaps) {
        self.caps = caps;
        self.invalidate();
    }

    pub fn set_clip_policy(&mut self, policy: ClipPolicy) {
        self.policy = policy;
        self.invalidate();
    }

    pub fn set_user_clip_planes(&mut self, planes: UserClipPlanes) -> Result<(), DrawError> {
        if planes.planes.len() > MAX_USER_CLIP_PLANES {
            return Err(DrawError::TooManyClipPlanes(
                planes.planes.len(),
                MAX_USER_CLIP_PLANES,
            ));
        }
        self.planes = planes;
        self.invalidate();
        Ok(())
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<(), DrawError> {
        if viewports.is_empty() || viewports.len() > MAX_VIEWPORTS {
            return Err(DrawError::TooManyViewports(viewports.len(), MAX_VIEWPORTS));
        }
        self.viewports = viewports.to_vec();
        self.invalidate();
        Ok(())
    }

    pub fn set_polygon_stipple(&mut self, pattern: [u32; 32]) {
        self.poly_stipple = pattern;
        self.invalidate();
    }

    /// Patch size and the default tess levels used for components no TCS
    /// invocation writes.
    pub fn set_patch_state(&mut self, patch_vertices: u32, outer: [f32; 4], inner: [f32; 2]) {
        self.patch_vertices = patch_vertices;
        self.default_outer = outer;
        self.default_inner = inner;
        self.invalidate();
    }

    pub fn set_vertex_elements(
        &mut self,
        elements: &[VertexElement],
        num_buffers: usize,
    ) -> Result<(), DrawError> {
        self.fetch = FetchMachine::new(elements, num_buffers)?;
        self.invalidate();
        Ok(())
    }

    /// Bind the capture layout and targets. Target append offsets start
    /// fresh; use [`take_stream_targets`](Self::take_stream_targets) to
    /// read results back.
    pub fn set_stream_output(&mut self, layout: SoLayout, targets: Vec<SoTarget>) {
        self.so_layout = layout;
        self.so_targets = targets;
        self.invalidate();
    }

    pub fn take_stream_targets(&mut self) -> Vec<SoTarget> {
        self.so_layout = SoLayout::default();
        std::mem::take(&mut self.so_targets)
    }

    /// Which driver-fallback stages (AA lines/points, polygon stipple) this
    /// driver wants routed through the pipeline.
    pub fn install_stages(&mut self, installs: StageInstalls) {
        self.installs = installs;
        self.invalidate();
    }

    pub fn set_driver_hooks(&mut self, hooks: Box<dyn DriverHooks>) {
        self.hooks = hooks;
    }

    pub fn stats(&self) -> DrawStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&mut self) {
        self.stats = DrawStats::default();
    }

    /// Output layout of the last shading stage that runs: mesh, then GS,
    /// then TES, then VS.
    pub fn current_shader_info(&self) -> Result<&ShaderInfo, DrawError> {
        if let Some(m) = &self.mesh {
            return Ok(m.info());
        }
        if let Some(gs) = &self.gs {
            return Ok(gs.info());
        }
        if let Some(tes) = &self.tes {
            return Ok(tes.info());
        }
        match &self.vs {
            Some(vs) => Ok(vs.info()),
            None => Err(DrawError::MissingVertexShader),
        }
    }

    fn chain_state<'a>(&'a self, info: &'a ShaderInfo) -> ChainState<'a> {
        ChainState {
            rast: &self.rast,
            caps: &self.caps,
            policy: &self.policy,
            planes: &self.planes,
            info,
            frag: &self.frag,
            installs: self.installs,
        }
    }

    /// Rebuild derived state: validate, assign synthetic attribute slots,
    /// and construct the stage chain. Idempotent until invalidated.
    fn prepare(&mut self) -> Result<(), DrawError> {
        if self.prepared.is_some() {
            return Ok(());
        }
        let info = self.current_shader_info()?.clone();
        self.so_layout.validate(&info, self.so_targets.len())?;

        let state = self.chain_state(&info);
        let mut builder = ExtraSlotsBuilder::new(info.num_outputs);
        if state.unfilled_active() && self.frag.needs_front_face {
            builder.reserve(ExtraSemantic::FrontFace, 0)?;
        }
        if state.wideline_active() || state.aaline_active() {
            builder.reserve(ExtraSemantic::LineCoord, 0)?;
        }
        if state.widepoint_active() || state.aapoint_active() {
            builder.reserve(ExtraSemantic::PointCoord, 0)?;
        }
        let pipeline = build_chain(&state);
        let extra = builder.build();

        debug!(
            stages = pipeline.stage_count(),
            extra_slots = extra.num_extra(),
            "stage chain rebuilt"
        );
        self.stats.chain_rebuilds += 1;
        self.prepared = Some(Prepared {
            info,
            extra,
            pipeline,
        });
        Ok(())
    }

    /// Submit one draw call: one or more ranges over the bound state.
    pub fn draw(
        &mut self,
        sink: &mut dyn RenderSink,
        buffers: &VertexBuffers<'_>,
        constants: &Constants<'_>,
        info: &DrawInfo<'_>,
        ranges: &[DrawRange],
    ) -> Result<(), DrawError> {
        debug_assert!(!self.in_draw, "draw reentered");
        self.in_draw = true;
        let result = self.draw_inner(sink, buffers, constants, info, ranges);
        self.in_draw = false;
        result
    }

    fn draw_inner(
        &mut self,
        sink: &mut dyn RenderSink,
        buffers: &VertexBuffers<'_>,
        constants: &Constants<'_>,
        info: &DrawInfo<'_>,
        ranges: &[DrawRange],
    ) -> Result<(), DrawError> {
        if self.vs.is_none() {
            return Err(DrawError::MissingVertexShader);
        }
        if info.topology == PrimitiveTopology::Patches && self.tes.is_none() {
            return Err(DrawError::PatchesWithoutTessellation);
        }
        self.prepare()?;
        self.stats.draws += 1;

        let tess = match (&self.tes, info.topology) {
            (Some(tes), PrimitiveTopology::Patches) => Some(Tessellator {
                tcs: self.tcs.as_deref(),
                tes: tes.as_ref(),
                patch_vertices: self.patch_vertices,
                default_outer: self.default_outer,
                default_inner: self.default_inner,
            }),
            _ => None,
        };

        let Prepared {
            info: stage_info,
            extra,
            pipeline,
        } = self.prepared.as_mut().expect("prepared above");
        let stage_info = &*stage_info;
        let extra = &*extra;

        let ops = {
            // Immutable self borrows only; `prepared` stays split off.
            let mut ops = OpsMask::empty();
            if !sink.bypass_shading() {
                ops |= OpsMask::SHADE;
            }
            if self.policy.clip_xy || self.policy.clip_z || self.policy.clip_user {
                ops |= OpsMask::CLIPTEST;
            }
            let state = ChainState {
                rast: &self.rast,
                caps: &self.caps,
                policy: &self.policy,
                planes: &self.planes,
                info: stage_info,
                frag: &self.frag,
                installs: self.installs,
            };
            let needs = sink
                .need_pipeline(&self.rast, info.topology)
                .unwrap_or_else(|| need_pipeline(&state, info.topology));
            if needs {
                ops |= OpsMask::PIPELINE;
            }
            ops
        };

        let params = PipelineParams {
            rast: &self.rast,
            caps: &self.caps,
            policy: &self.policy,
            planes: &self.planes,
            viewports: &self.viewports,
            info: stage_info,
            frag: &self.frag,
            extra,
            poly_stipple: &self.poly_stipple,
        };
        let me = MiddleEnd {
            fetch: &self.fetch,
            buffers,
            max_index: self.fetch.max_index(buffers),
            constants,
            vs: self.vs.as_deref(),
            tess: tess.as_ref(),
            gs: self.gs.as_deref(),
            so: &self.so_layout,
            params: &params,
            ops,
            first_provoking: self.rast.flatshade_first,
            patch_vertices: self.patch_vertices,
        };

        let use_general = ops.intersects(OpsMask::PIPELINE | OpsMask::CLIPTEST)
            || me.gs.is_some()
            || me.tess.is_some()
            || self.so_layout.is_active();
        let instances = info.instance_count.max(1);

        debug!(
            topology = %info.topology,
            ops = ?ops,
            general = use_general,
            instances,
            "draw"
        );

        if use_general {
            let mut emitter = PipeEmitter::new(sink, extra.total_slots());
            let mut ctx = StageCtx {
                params: &params,
                hooks: self.hooks.as_mut(),
                stats: &mut self.stats,
                emit: &mut emitter,
            };
            for range in ranges {
                let runs = build_runs(info, *range, self.patch_vertices);
                for instance in 0..instances {
                    for run in &runs {
                        me.run_general(run, instance, pipeline, &mut self.so_targets, &mut ctx)?;
                    }
                    pipeline.reset_stipple_counter();
                }
            }
            pipeline.flush(&mut ctx);
        } else {
            for range in ranges {
                let runs = build_runs(info, *range, self.patch_vertices);
                for instance in 0..instances {
                    for run in &runs {
                        me.run_fast(run, instance, sink, &mut self.stats);
                    }
                }
            }
        }
        sink.report_statistics(&self.stats);
        Ok(())
    }

    /// Submit one mesh-shader draw: the executor produces geometry
    /// wholesale; fetch, VS, tessellation and GS are bypassed.
    pub fn draw_mesh(
        &mut self,
        sink: &mut dyn RenderSink,
        constants: &Constants<'_>,
    ) -> Result<(), DrawError> {
        debug_assert!(!self.in_draw, "draw reentered");
        self.in_draw = true;
        let result = self.draw_mesh_inner(sink, constants);
        self.in_draw = false;
        result
    }

    fn draw_mesh_inner(
        &mut self,
        sink: &mut dyn RenderSink,
        constants: &Constants<'_>,
    ) -> Result<(), DrawError> {
        if self.mesh.is_none() {
            return Err(DrawError::MissingMeshShader);
        }
        self.prepare()?;
        self.stats.draws += 1;

        let mesh = self.mesh.as_deref().expect("checked above");
        let out = mesh.run(constants);

        let Prepared {
            info: stage_info,
            extra,
            pipeline,
        } = self.prepared.as_mut().expect("prepared above");
        let stage_info = &*stage_info;
        let extra = &*extra;

        let params = PipelineParams {
            rast: &self.rast,
            caps: &self.caps,
            policy: &self.policy,
            planes: &self.planes,
            viewports: &self.viewports,
            info: stage_info,
            frag: &self.frag,
            extra,
            poly_stipple: &self.poly_stipple,
        };
        let empty_buffers = VertexBuffers::default();
        let me = MiddleEnd {
            fetch: &self.fetch,
            buffers: &empty_buffers,
            max_index: 0,
            constants,
            vs: None,
            tess: None,
            gs: None,
            so: &self.so_layout,
            params: &params,
            ops: OpsMask::CLIPTEST,
            first_provoking: self.rast.flatshade_first,
            patch_vertices: 0,
        };

        let count = out.vertices.count() as u32;
        let elements: Vec<u32> = if out.indices.is_empty() {
            (0..count).collect()
        } else {
            out.indices.iter().map(|&i| i as u32).collect()
        };
        let ids: Vec<u32> = (0..count).collect();

        let mut emitter = PipeEmitter::new(sink, extra.total_slots());
        let mut ctx = StageCtx {
            params: &params,
            hooks: self.hooks.as_mut(),
            stats: &mut self.stats,
            emit: &mut emitter,
        };
        me.feed_pipeline(
            &out.vertices,
            &ids,
            &elements,
            out.topology,
            RunFlags::empty(),
            pipeline,
            &mut ctx,
        );
        pipeline.flush(&mut ctx);
        sink.report_statistics(&self.stats);
        Ok(())
    }

    /// Land pending work and report statistics. The pipeline already drains
    /// at the end of every draw; this reports counters and gives the driver
    /// a flush boundary to key on.
    pub fn flush(&mut self, sink: &mut dyn RenderSink, reason: FlushReason) {
        debug!(?reason, "context flush");
        sink.report_statistics(&self.stats);
    }
}
