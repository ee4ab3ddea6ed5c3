//! Face culling and shader-written cull-distance rejection.

use super::{forward, PipePrim, Stage, StageCtx};
use crate::state::CullMode;

/// Is a triangle with determinant `det` front-facing under `front_ccw`?
/// Positive determinant means counter-clockwise in clip-space XY.
pub fn is_front(det: f32, front_ccw: bool) -> bool {
    (det > 0.0) == front_ccw
}

pub struct CullStage;

impl CullStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        if let PipePrim::Tri { det, .. } = prim {
            let rast = ctx.params.rast;
            // Zero-area triangles rasterize to nothing; discard them here.
            if det == 0.0 {
                ctx.stats.culled += 1;
                return;
            }
            let front = is_front(det, rast.front_ccw);
            let drop = match rast.cull {
                CullMode::None => false,
                CullMode::Front => front,
                CullMode::Back => !front,
                CullMode::FrontAndBack => true,
            };
            if drop {
                ctx.stats.culled += 1;
                return;
            }
        }
        forward(rest, ctx, prim);
    }
}

/// Rejects primitives where a shader-written cull distance is negative for
/// every vertex.
pub struct UserCullStage;

impl UserCullStage {
    fn culled(&self, ctx: &StageCtx<'_, '_>, verts: &[&crate::prim::PipeVertex]) -> bool {
        let info = ctx.params.info;
        for i in 0..info.num_written_culldistance {
            let Some(slot) = info.culldist_outputs[i / 4] else {
                continue;
            };
            let comp = i % 4;
            if verts.iter().all(|v| {
                let d = v.data[slot][comp];
                // NaN compares false with >= 0.0, counting as outside.
                !(d >= 0.0)
            }) {
                return true;
            }
        }
        false
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let drop = match &prim {
            PipePrim::Point { v, .. } => self.culled(ctx, &[v]),
            PipePrim::Line { v, .. } => self.culled(ctx, &[&v[0], &v[1]]),
            PipePrim::Tri { v, .. } => self.culled(ctx, &[&v[0], &v[1], &v[2]]),
        };
        if drop {
            ctx.stats.culled += 1;
            return;
        }
        forward(rest, ctx, prim);
    }
}
