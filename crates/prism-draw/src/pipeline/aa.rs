//! Antialiased line/point fallback: triangulate with a half-pixel filter
//! margin and route coverage computation to a patched fragment shader.
//!
//! Both stages substitute driver state on first use (coverage shader plus
//! a rasterizer variant with culling, stippling and unfilled modes turned
//! off, so the synthesized quads draw as plain filled triangles) and
//! restore it on flush. If the driver declines the shader bind the stage
//! degrades to passthrough.

use tracing::warn;

use super::wide::{emit_quad, point_size};
use super::{forward, PipePrim, Stage, StageCtx};
use crate::extra::ExtraSemantic;
use crate::prim::PipeVertex;
use crate::state::{CullMode, FillMode, Rasterizer};

/// Extra window-space radius so the coverage filter has room to ramp to
/// zero outside the mathematical footprint.
const FILTER_MARGIN: f32 = 0.5;

fn substitute_rasterizer(rast: &Rasterizer) -> Rasterizer {
    Rasterizer {
        cull: CullMode::None,
        fill_front: FillMode::Fill,
        fill_back: FillMode::Fill,
        line_smooth: false,
        point_smooth: false,
        line_stipple_enable: false,
        poly_stipple_enable: false,
        ..rast.clone()
    }
}

pub struct AaLineStage {
    bound: bool,
    failed: bool,
}

impl AaLineStage {
    pub fn new() -> Self {
        Self {
            bound: false,
            failed: false,
        }
    }

    fn try_bind(&mut self, ctx: &mut StageCtx<'_, '_>, coord_slot: Option<usize>) -> bool {
        if self.bound {
            return true;
        }
        if self.failed {
            return false;
        }
        let ok = match coord_slot {
            Some(slot) => ctx.hooks.bind_aaline_shader(slot),
            None => false,
        };
        if ok {
            ctx.hooks
                .bind_rasterizer_state(&substitute_rasterizer(ctx.params.rast));
            self.bound = true;
        } else {
            warn!("aa-line shader bind failed; drawing aliased lines");
            self.failed = true;
        }
        ok
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Line { v, .. } = prim else {
            forward(rest, ctx, prim);
            return;
        };
        let coord_slot = ctx.params.extra.slot(ExtraSemantic::LineCoord, 0);
        if !self.try_bind(ctx, coord_slot) {
            forward(rest, ctx, PipePrim::Line { v, flags: crate::prim::PrimFlags::empty() });
            return;
        }

        let half = ctx.params.rast.line_width.max(1.0) * 0.5 + FILTER_MARGIN;
        let pos = ctx.params.info.position_output;
        let slot = coord_slot.unwrap();

        let p0 = v[0].data[pos];
        let p1 = v[1].data[pos];
        let x_major = (p1[0] - p0[0]).abs() >= (p1[1] - p0[1]).abs();
        let (ox, oy) = if x_major { (0.0, half) } else { (half, 0.0) };

        // Coord: x = endpoint parameter, y = signed across-line distance in
        // units of the half-width, w = half-width in pixels for the coverage
        // shader's distance reconstruction.
        let mk = |src: &PipeVertex, s: f32, sign: f32| -> PipeVertex {
            let mut out = src.clone();
            out.data[pos][0] += ox * sign;
            out.data[pos][1] += oy * sign;
            out.data[slot] = [s, sign, 0.0, half];
            out
        };
        let corners = [
            mk(&v[0], 0.0, -1.0),
            mk(&v[1], 1.0, -1.0),
            mk(&v[1], 1.0, 1.0),
            mk(&v[0], 0.0, 1.0),
        ];
        emit_quad(ctx, rest, corners);
    }

    pub fn flush(&mut self, ctx: &mut StageCtx<'_, '_>) {
        if self.bound {
            ctx.hooks.restore();
            self.bound = false;
        }
    }
}

impl Default for AaLineStage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AaPointStage {
    bound: bool,
    failed: bool,
}

impl AaPointStage {
    pub fn new() -> Self {
        Self {
            bound: false,
            failed: false,
        }
    }

    fn try_bind(&mut self, ctx: &mut StageCtx<'_, '_>, coord_slot: Option<usize>) -> bool {
        if self.bound {
            return true;
        }
        if self.failed {
            return false;
        }
        let ok = match coord_slot {
            Some(slot) => ctx.hooks.bind_aapoint_shader(slot),
            None => false,
        };
        if ok {
            ctx.hooks
                .bind_rasterizer_state(&substitute_rasterizer(ctx.params.rast));
            self.bound = true;
        } else {
            warn!("aa-point shader bind failed; drawing aliased points");
            self.failed = true;
        }
        ok
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Point { v, flags } = prim else {
            forward(rest, ctx, prim);
            return;
        };
        let coord_slot = ctx.params.extra.slot(ExtraSemantic::PointCoord, 0);
        if !self.try_bind(ctx, coord_slot) {
            forward(rest, ctx, PipePrim::Point { v, flags });
            return;
        }

        let half = point_size(ctx, &v).max(1.0) * 0.5 + FILTER_MARGIN;
        let pos = ctx.params.info.position_output;
        let slot = coord_slot.unwrap();

        // Coord: (x, y) = position in units of the half-size, center at the
        // origin; w = half-size in pixels.
        let mk = |sx: f32, sy: f32| -> PipeVertex {
            let mut out = (*v).clone();
            out.data[pos][0] += half * sx;
            out.data[pos][1] += half * sy;
            out.data[slot] = [sx, sy, 0.0, half];
            out
        };
        let corners = [
            mk(-1.0, -1.0),
            mk(1.0, -1.0),
            mk(1.0, 1.0),
            mk(-1.0, 1.0),
        ];
        emit_quad(ctx, rest, corners);
    }

    pub fn flush(&mut self, ctx: &mut StageCtx<'_, '_>) {
        if self.bound {
            ctx.hooks.restore();
            self.bound = false;
        }
    }
}

impl Default for AaPointStage {
    fn default() -> Self {
        Self::new()
    }
}
