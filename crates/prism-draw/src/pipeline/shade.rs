//! Flat-shade precompute and two-sided lighting resolve.

use super::cull::is_front;
use super::{forward, PipePrim, Stage, StageCtx};

/// Copies flat-interpolated attributes from the provoking vertex onto the
/// other vertices of a primitive, so later decomposition (stipple,
/// unfilled, wide lines) cannot lose the provoking values.
pub struct FlatShadeStage;

impl FlatShadeStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], mut prim: PipePrim) {
        let flat = &ctx.params.frag.flat_slots;
        if !flat.is_empty() {
            let first = ctx.params.rast.flatshade_first;
            match &mut prim {
                PipePrim::Point { .. } => {}
                PipePrim::Line { v, .. } => {
                    let (src, dst) = if first { (0, 1) } else { (1, 0) };
                    for &slot in flat {
                        v[dst].data[slot] = v[src].data[slot];
                    }
                }
                PipePrim::Tri { v, .. } => {
                    let src = if first { 0 } else { 2 };
                    for &slot in flat {
                        let val = v[src].data[slot];
                        for dst in 0..3 {
                            v[dst].data[slot] = val;
                        }
                    }
                }
            }
        }
        forward(rest, ctx, prim);
    }
}

/// Swaps the back-color outputs into the front-color slots for back-facing
/// triangles.
pub struct TwoSideStage;

impl TwoSideStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], mut prim: PipePrim) {
        if let PipePrim::Tri { v, det, .. } = &mut prim {
            let info = ctx.params.info;
            if !is_front(*det, ctx.params.rast.front_ccw) {
                for i in 0..2 {
                    if let (Some(front), Some(back)) =
                        (info.color_outputs[i], info.back_color_outputs[i])
                    {
                        for vert in v.iter_mut() {
                            vert.data[front] = vert.data[back];
                        }
                    }
                }
            }
        }
        forward(rest, ctx, prim);
    }
}
