//! Unfilled (wireframe/point) polygon-mode decomposition.

use super::cull::is_front;
use super::{forward, PipePrim, Stage, StageCtx};
use crate::extra::ExtraSemantic;
use crate::prim::PrimFlags;
use crate::state::FillMode;

pub struct UnfilledStage;

impl UnfilledStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Tri { mut v, flags, det } = prim else {
            forward(rest, ctx, prim);
            return;
        };

        let rast = ctx.params.rast;
        let front = is_front(det, rast.front_ccw);
        let mode = if front { rast.fill_front } else { rast.fill_back };

        // Synthesize the front-face attribute when the fragment stage needs
        // it: rasterizers cannot derive facing from decomposed lines/points.
        if ctx.params.frag.needs_front_face {
            if let Some(slot) = ctx.params.extra.slot(ExtraSemantic::FrontFace, 0) {
                let val = [if front { 1.0 } else { 0.0 }, 0.0, 0.0, 1.0];
                for vert in v.iter_mut() {
                    vert.data[slot] = val;
                }
            }
        }

        match mode {
            FillMode::Fill => forward(rest, ctx, PipePrim::Tri { v, flags, det }),
            FillMode::Line => {
                // Only originally-existing edges are drawn; edges introduced
                // by earlier splitting carry cleared flags.
                let edges = [
                    (PrimFlags::EDGE_0, 0usize, 1usize),
                    (PrimFlags::EDGE_1, 1, 2),
                    (PrimFlags::EDGE_2, 2, 0),
                ];
                let mut first = true;
                for (bit, a, b) in edges {
                    if !flags.contains(bit) {
                        continue;
                    }
                    let f = if first {
                        PrimFlags::RESET_STIPPLE
                    } else {
                        PrimFlags::empty()
                    };
                    first = false;
                    forward(
                        rest,
                        ctx,
                        PipePrim::Line {
                            v: Box::new([v[a].clone(), v[b].clone()]),
                            flags: f,
                        },
                    );
                }
            }
            FillMode::Point => {
                for vert in v.iter() {
                    if !vert.edgeflag {
                        continue;
                    }
                    forward(
                        rest,
                        ctx,
                        PipePrim::Point {
                            v: Box::new(vert.clone()),
                            flags: PrimFlags::empty(),
                        },
                    );
                }
            }
        }
    }
}
