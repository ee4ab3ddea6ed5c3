//! Wide-line and wide-point quad expansion.

use super::{forward, PipePrim, Stage, StageCtx};
use crate::extra::ExtraSemantic;
use crate::prim::{PipeVertex, PrimFlags};

/// Emit the two triangles of a screen-aligned quad.
pub(super) fn emit_quad(
    ctx: &mut StageCtx<'_, '_>,
    rest: &mut [Stage],
    corners: [PipeVertex; 4],
) {
    let [c0, c1, c2, c3] = corners;
    forward(
        rest,
        ctx,
        PipePrim::Tri {
            v: Box::new([c0.clone(), c1, c2.clone()]),
            flags: PrimFlags::all_edges(),
            det: 0.0,
        },
    );
    forward(
        rest,
        ctx,
        PipePrim::Tri {
            v: Box::new([c0, c2, c3]),
            flags: PrimFlags::all_edges(),
            det: 0.0,
        },
    );
}

/// Per-vertex point size when the shader writes one, else the state size.
pub(super) fn point_size(ctx: &StageCtx<'_, '_>, v: &PipeVertex) -> f32 {
    match ctx.params.info.point_size_output {
        Some(slot) => v.data[slot][0],
        None => ctx.params.rast.point_size,
    }
}

/// Triangulates lines wider than the driver threshold into two triangles,
/// offsetting along the minor axis. A synthetic line-coord attribute
/// carries the signed distance from the center-line (`+-width/2`).
pub struct WideLineStage;

impl WideLineStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Line { v, .. } = prim else {
            forward(rest, ctx, prim);
            return;
        };

        let half = ctx.params.rast.line_width * 0.5;
        let pos = ctx.params.info.position_output;
        let coord_slot = ctx.params.extra.slot(ExtraSemantic::LineCoord, 0);

        let p0 = v[0].data[pos];
        let p1 = v[1].data[pos];
        let x_major = (p1[0] - p0[0]).abs() >= (p1[1] - p0[1]).abs();
        let (ox, oy) = if x_major { (0.0, half) } else { (half, 0.0) };

        let mk = |src: &PipeVertex, sign: f32| -> PipeVertex {
            let mut out = src.clone();
            out.data[pos][0] += ox * sign;
            out.data[pos][1] += oy * sign;
            if let Some(slot) = coord_slot {
                out.data[slot] = [half * sign, 0.0, 0.0, 1.0];
            }
            out
        };
        // Quad corners: minus side at both endpoints, then plus side.
        let corners = [mk(&v[0], -1.0), mk(&v[1], -1.0), mk(&v[1], 1.0), mk(&v[0], 1.0)];
        emit_quad(ctx, rest, corners);
    }
}

/// Triangulates large points into screen-aligned quads, synthesizing
/// sprite texcoords into the point-coord slot.
pub struct WidePointStage;

impl WidePointStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Point { v, .. } = prim else {
            forward(rest, ctx, prim);
            return;
        };

        let half = point_size(ctx, &v) * 0.5;
        let pos = ctx.params.info.position_output;
        let coord_slot = ctx.params.extra.slot(ExtraSemantic::PointCoord, 0);
        let upper_left = ctx.params.rast.sprite_coord_origin_upper_left;

        let mk = |sx: f32, sy: f32, s: f32, t: f32| -> PipeVertex {
            let mut out = (*v).clone();
            out.data[pos][0] += half * sx;
            out.data[pos][1] += half * sy;
            if let Some(slot) = coord_slot {
                let t = if upper_left { t } else { 1.0 - t };
                out.data[slot] = [s, t, 0.0, 1.0];
            }
            out
        };
        let corners = [
            mk(-1.0, -1.0, 0.0, 0.0),
            mk(1.0, -1.0, 1.0, 0.0),
            mk(1.0, 1.0, 1.0, 1.0),
            mk(-1.0, 1.0, 0.0, 1.0),
        ];
        emit_quad(ctx, rest, corners);
    }
}
