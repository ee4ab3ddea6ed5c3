//! The fixed-function primitive pipeline: an ordered chain of stages, each
//! consuming one primitive and emitting zero or more to the next stage.
//!
//! The chain is a plain `Vec<Stage>` over a closed enum, rebuilt by the
//! pure function [`build_chain`] whenever state invalidates it. Stage order
//! (execution order, head first): user-cull → clip → cull → two-side →
//! offset → flat-shade → unfilled → polygon-stipple → line-stipple →
//! wide-point → wide-line → AA-point → AA-line → rasterize. Disabled stages
//! are absent entirely.
//!
//! The triangle determinant (2D signed area over clip-space X/Y) is
//! computed once at pipeline entry and carried in the primitive header, so
//! every stage reads the same value regardless of its chain position.

pub mod aa;
pub mod clip;
pub mod cull;
mod emit;
pub mod offset;
pub mod shade;
pub mod stipple;
pub mod unfilled;
pub mod wide;

pub use emit::PipeEmitter;

use crate::extra::ExtraSlots;
use crate::prim::{PipePrim, PipeVertex, PrimFlags};
use crate::shader::{FragmentInfo, ShaderInfo};
use crate::state::{ClipPolicy, CullMode, FillMode, PipelineCaps, Rasterizer, UserClipPlanes, Viewport};
use crate::stats::DrawStats;
use crate::topology::PrimitiveTopology;

/// Driver-supplied hooks the AA/stipple stages use to patch the bound
/// fragment shader and rasterizer state. All methods have inert defaults;
/// a bind returning `false` makes the stage fall back to passthrough.
pub trait DriverHooks {
    fn bind_aaline_shader(&mut self, _coord_slot: usize) -> bool {
        false
    }
    fn bind_aapoint_shader(&mut self, _coord_slot: usize) -> bool {
        false
    }
    fn bind_pstipple_shader(&mut self, _pattern: &[u32; 32]) -> bool {
        false
    }
    /// Bind a substitute rasterizer state for synthesized geometry.
    fn bind_rasterizer_state(&mut self, _rast: &Rasterizer) {}
    /// Undo any shader/state substitution made by the stage.
    fn restore(&mut self) {}
}

/// Default no-op hooks.
#[derive(Debug, Default)]
pub struct NullHooks;

impl DriverHooks for NullHooks {}

/// Which optional driver-fallback stages have been installed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageInstalls {
    pub aaline: bool,
    pub aapoint: bool,
    pub pstipple: bool,
}

/// Read-only parameters shared by all stages for one draw.
pub struct PipelineParams<'a> {
    pub rast: &'a Rasterizer,
    pub caps: &'a PipelineCaps,
    pub policy: &'a ClipPolicy,
    pub planes: &'a UserClipPlanes,
    pub viewports: &'a [Viewport],
    pub info: &'a ShaderInfo,
    pub frag: &'a FragmentInfo,
    pub extra: &'a ExtraSlots,
    pub poly_stipple: &'a [u32; 32],
}

/// Mutable context threaded through the chain.
pub struct StageCtx<'a, 'b> {
    pub params: &'a PipelineParams<'a>,
    pub hooks: &'a mut dyn DriverHooks,
    pub stats: &'a mut DrawStats,
    pub emit: &'a mut PipeEmitter<'b>,
}

/// Closed stage-kind set; dispatch is a match, not function-pointer tables.
pub enum Stage {
    UserCull(cull::UserCullStage),
    Clip(clip::ClipStage),
    Cull(cull::CullStage),
    TwoSide(shade::TwoSideStage),
    Offset(offset::OffsetStage),
    FlatShade(shade::FlatShadeStage),
    Unfilled(unfilled::UnfilledStage),
    PStipple(stipple::PStippleStage),
    Stipple(stipple::StippleStage),
    WidePoint(wide::WidePointStage),
    WideLine(wide::WideLineStage),
    AaPoint(aa::AaPointStage),
    AaLine(aa::AaLineStage),
    Rasterize,
}

impl Stage {
    fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        match self {
            Stage::UserCull(s) => s.process(ctx, rest, prim),
            Stage::Clip(s) => s.process(ctx, rest, prim),
            Stage::Cull(s) => s.process(ctx, rest, prim),
            Stage::TwoSide(s) => s.process(ctx, rest, prim),
            Stage::Offset(s) => s.process(ctx, rest, prim),
            Stage::FlatShade(s) => s.process(ctx, rest, prim),
            Stage::Unfilled(s) => s.process(ctx, rest, prim),
            Stage::PStipple(s) => s.process(ctx, rest, prim),
            Stage::Stipple(s) => s.process(ctx, rest, prim),
            Stage::WidePoint(s) => s.process(ctx, rest, prim),
            Stage::WideLine(s) => s.process(ctx, rest, prim),
            Stage::AaPoint(s) => s.process(ctx, rest, prim),
            Stage::AaLine(s) => s.process(ctx, rest, prim),
            Stage::Rasterize => match prim {
                PipePrim::Point { v, .. } => {
                    ctx.stats.prims_out += 1;
                    ctx.emit.point(&v);
                }
                PipePrim::Line { v, .. } => {
                    ctx.stats.prims_out += 1;
                    ctx.emit.line(&v[0], &v[1]);
                }
                PipePrim::Tri { v, .. } => {
                    ctx.stats.prims_out += 1;
                    ctx.emit.tri(&v[0], &v[1], &v[2]);
                }
            },
        }
    }

    fn flush(&mut self, ctx: &mut StageCtx<'_, '_>) {
        match self {
            Stage::PStipple(s) => s.flush(ctx),
            Stage::AaPoint(s) => s.flush(ctx),
            Stage::AaLine(s) => s.flush(ctx),
            _ => {}
        }
    }

    fn reset_stipple_counter(&mut self) {
        if let Stage::Stipple(s) = self {
            s.reset_counter();
        }
    }
}

/// Hand `prim` to the next stage in the chain.
pub(crate) fn forward(stages: &mut [Stage], ctx: &mut StageCtx<'_, '_>, prim: PipePrim) {
    match stages.split_first_mut() {
        Some((head, rest)) => head.process(ctx, rest, prim),
        None => debug_assert!(false, "stage chain must terminate in rasterize"),
    }
}

/// 2D signed area over clip-space X/Y of the first three vertices. Positive
/// for counter-clockwise order.
pub fn tri_determinant(v: &[PipeVertex; 3]) -> f32 {
    let [x0, y0] = [v[0].clip_pos[0], v[0].clip_pos[1]];
    let [x1, y1] = [v[1].clip_pos[0], v[1].clip_pos[1]];
    let [x2, y2] = [v[2].clip_pos[0], v[2].clip_pos[1]];
    (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)
}

/// The built pipeline: entry points compute the per-primitive determinant
/// and feed the chain.
pub struct PrimPipeline {
    chain: Vec<Stage>,
}

impl PrimPipeline {
    pub fn point(&mut self, ctx: &mut StageCtx<'_, '_>, v: PipeVertex, flags: PrimFlags) {
        forward(
            &mut self.chain,
            ctx,
            PipePrim::Point {
                v: Box::new(v),
                flags,
            },
        );
    }

    pub fn line(&mut self, ctx: &mut StageCtx<'_, '_>, v: [PipeVertex; 2], flags: PrimFlags) {
        forward(
            &mut self.chain,
            ctx,
            PipePrim::Line {
                v: Box::new(v),
                flags,
            },
        );
    }

    pub fn tri(&mut self, ctx: &mut StageCtx<'_, '_>, v: [PipeVertex; 3], flags: PrimFlags) {
        let det = tri_determinant(&v);
        forward(
            &mut self.chain,
            ctx,
            PipePrim::Tri {
                v: Box::new(v),
                flags,
                det,
            },
        );
    }

    /// Propagate a flush: stages restore any substituted driver state, then
    /// the emitter drains to the sink.
    pub fn flush(&mut self, ctx: &mut StageCtx<'_, '_>) {
        for stage in &mut self.chain {
            stage.flush(ctx);
        }
        ctx.emit.flush();
    }

    /// A new line run began: reset stipple counters downstream.
    pub fn reset_stipple_counter(&mut self) {
        for stage in &mut self.chain {
            stage.reset_stipple_counter();
        }
    }

    /// Number of stages in the chain, the terminal rasterize stage included.
    pub fn stage_count(&self) -> usize {
        self.chain.len()
    }
}

/// What the chain builder needs to know about current state.
pub struct ChainState<'a> {
    pub rast: &'a Rasterizer,
    pub caps: &'a PipelineCaps,
    pub policy: &'a ClipPolicy,
    pub planes: &'a UserClipPlanes,
    pub info: &'a ShaderInfo,
    pub frag: &'a FragmentInfo,
    pub installs: StageInstalls,
}

impl ChainState<'_> {
    pub(crate) fn clip_active(&self) -> bool {
        self.policy.clip_xy
            || self.policy.clip_z
            || (self.policy.clip_user
                && (!self.planes.planes.is_empty() || self.info.num_written_clipdistance > 0))
    }

    pub(crate) fn aaline_active(&self) -> bool {
        self.rast.line_smooth && self.installs.aaline
    }

    pub(crate) fn aapoint_active(&self) -> bool {
        self.rast.point_smooth && self.installs.aapoint
    }

    pub(crate) fn wideline_active(&self) -> bool {
        !self.aaline_active() && self.rast.line_width > self.caps.wide_line_threshold
    }

    pub(crate) fn widepoint_active(&self) -> bool {
        if self.aapoint_active() {
            return false;
        }
        self.rast.point_size > self.caps.wide_point_threshold
            || self.info.point_size_output.is_some() && self.caps.wide_point_threshold <= 0.0
            || (self.caps.wide_point_sprites && self.rast.point_quad_rasterization)
    }

    pub(crate) fn stipple_active(&self) -> bool {
        self.rast.line_stipple_enable && self.caps.line_stipple
    }

    pub(crate) fn pstipple_active(&self) -> bool {
        self.rast.poly_stipple_enable && self.installs.pstipple
    }

    pub(crate) fn unfilled_active(&self) -> bool {
        self.rast.fill_front != FillMode::Fill || self.rast.fill_back != FillMode::Fill
    }

    pub(crate) fn offset_active(&self) -> bool {
        self.rast.offset_tri || self.rast.offset_line || self.rast.offset_point
    }

    pub(crate) fn twoside_active(&self) -> bool {
        self.rast.light_twoside && self.info.back_color_outputs.iter().any(Option::is_some)
    }

    pub(crate) fn flatshade_active(&self) -> bool {
        self.rast.flatshade
            && !self.frag.flat_slots.is_empty()
            && (self.stipple_active()
                || self.unfilled_active()
                || self.wideline_active()
                || self.aaline_active())
    }
}

/// Pure chain construction from current state. Splice order follows the
/// validate stage's: each enabled stage goes in front of the previous head,
/// with the driver-supplied rasterize stage as the permanent tail.
pub fn build_chain(state: &ChainState<'_>) -> PrimPipeline {
    let mut chain: Vec<Stage> = vec![Stage::Rasterize];

    if state.aaline_active() {
        chain.insert(0, Stage::AaLine(aa::AaLineStage::new()));
    }
    if state.aapoint_active() {
        chain.insert(0, Stage::AaPoint(aa::AaPointStage::new()));
    }
    if state.wideline_active() {
        chain.insert(0, Stage::WideLine(wide::WideLineStage));
    }
    if state.widepoint_active() {
        chain.insert(0, Stage::WidePoint(wide::WidePointStage));
    }
    if state.stipple_active() {
        chain.insert(0, Stage::Stipple(stipple::StippleStage::new()));
    }
    if state.pstipple_active() {
        chain.insert(0, Stage::PStipple(stipple::PStippleStage::new()));
    }
    if state.unfilled_active() {
        chain.insert(0, Stage::Unfilled(unfilled::UnfilledStage));
    }
    if state.flatshade_active() {
        chain.insert(0, Stage::FlatShade(shade::FlatShadeStage));
    }
    if state.offset_active() {
        chain.insert(0, Stage::Offset(offset::OffsetStage));
    }
    if state.twoside_active() {
        chain.insert(0, Stage::TwoSide(shade::TwoSideStage));
    }
    if state.rast.cull != CullMode::None {
        chain.insert(0, Stage::Cull(cull::CullStage));
    }
    if state.clip_active() {
        chain.insert(0, Stage::Clip(clip::ClipStage::new()));
    }
    if state.info.num_written_culldistance > 0 {
        chain.insert(0, Stage::UserCull(cull::UserCullStage));
    }

    PrimPipeline { chain }
}

/// Built-in policy: does the current rasterizer + primitive combination
/// require any fixed-function stage (beyond clipping, which is tracked by
/// the separate CLIPTEST capability)?
pub fn need_pipeline(state: &ChainState<'_>, topology: PrimitiveTopology) -> bool {
    if state.info.num_written_culldistance > 0 {
        return true;
    }
    match topology.reduced(0) {
        crate::topology::ReducedPrim::Points => {
            state.widepoint_active() || state.aapoint_active()
        }
        crate::topology::ReducedPrim::Lines => {
            state.wideline_active() || state.aaline_active() || state.stipple_active()
        }
        crate::topology::ReducedPrim::Triangles => {
            state.unfilled_active()
                || state.pstipple_active()
                || state.offset_active()
                || state.twoside_active()
                || state.rast.cull == CullMode::FrontAndBack
        }
    }
}
