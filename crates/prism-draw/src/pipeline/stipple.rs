//! Line stipple (pattern-gated sub-segment emission) and the
//! polygon-stipple routing stage.

use tracing::warn;

use super::{forward, PipePrim, Stage, StageCtx};
use crate::prim::{ClipMask, PipeVertex, PrimFlags};

fn lerp_vertex(a: &PipeVertex, b: &PipeVertex, t: f32) -> PipeVertex {
    let lerp4 = |p: [f32; 4], q: [f32; 4]| -> [f32; 4] {
        [
            p[0] + t * (q[0] - p[0]),
            p[1] + t * (q[1] - p[1]),
            p[2] + t * (q[2] - p[2]),
            p[3] + t * (q[3] - p[3]),
        ]
    };
    PipeVertex {
        vertex_id: u32::MAX,
        clipmask: ClipMask::empty(),
        edgeflag: true,
        viewport_index: a.viewport_index,
        clip_pos: lerp4(a.clip_pos, b.clip_pos),
        data: a
            .data
            .iter()
            .zip(&b.data)
            .map(|(p, q)| lerp4(*p, *q))
            .collect(),
    }
}

/// Line stipple: walks the major axis of each line in pixel steps, emitting
/// the sub-segments whose pattern bit is set. The persistent counter
/// carries across segments of a strip and resets on `RESET_STIPPLE` (new
/// strip/loop) or explicit reset events.
pub struct StippleStage {
    counter: u32,
}

impl StippleStage {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        let PipePrim::Line { v, flags } = prim else {
            forward(rest, ctx, prim);
            return;
        };

        if flags.contains(PrimFlags::RESET_STIPPLE) {
            self.counter = 0;
        }

        let rast = ctx.params.rast;
        let pattern = rast.line_stipple_pattern as u32;
        // State stores factor - 1, like the repeat count registers it
        // mirrors; 0 means every pattern bit covers one pixel.
        let factor = rast.line_stipple_factor as u32 + 1;

        let pos = ctx.params.info.position_output;
        let p0 = v[0].data[pos];
        let p1 = v[1].data[pos];
        let dx = (p1[0] - p0[0]).abs();
        let dy = (p1[1] - p0[1]).abs();
        let length = dx.max(dy).ceil() as u32;

        if length == 0 {
            self.counter = self.counter.wrapping_add(1);
            forward(rest, ctx, PipePrim::Line { v, flags });
            return;
        }

        let mut span_start: Option<u32> = None;
        for i in 0..=length {
            let on = i < length && {
                let bit = ((self.counter + i) / factor) % 16;
                (pattern >> bit) & 1 != 0
            };
            match (on, span_start) {
                (true, None) => span_start = Some(i),
                (false, Some(s)) => {
                    let t0 = s as f32 / length as f32;
                    let t1 = i as f32 / length as f32;
                    let a = if s == 0 {
                        v[0].clone()
                    } else {
                        lerp_vertex(&v[0], &v[1], t0)
                    };
                    let b = if i == length {
                        v[1].clone()
                    } else {
                        lerp_vertex(&v[0], &v[1], t1)
                    };
                    span_start = None;
                    forward(
                        rest,
                        ctx,
                        PipePrim::Line {
                            v: Box::new([a, b]),
                            flags: PrimFlags::empty(),
                        },
                    );
                }
                _ => {}
            }
        }
        self.counter = self.counter.wrapping_add(length);
    }
}

impl Default for StippleStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Polygon stipple is applied per-fragment downstream; this stage's only
/// job is routing: bind the patched fragment shader on the first triangle
/// and restore it on flush.
pub struct PStippleStage {
    bound: bool,
    failed: bool,
}

impl PStippleStage {
    pub fn new() -> Self {
        Self {
            bound: false,
            failed: false,
        }
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        if matches!(prim, PipePrim::Tri { .. }) && !self.bound && !self.failed {
            if ctx.hooks.bind_pstipple_shader(ctx.params.poly_stipple) {
                self.bound = true;
            } else {
                // Degrade to unstippled polygons rather than dropping them.
                warn!("polygon-stipple shader bind failed; passing triangles through");
                self.failed = true;
            }
        }
        forward(rest, ctx, prim);
    }

    pub fn flush(&mut self, ctx: &mut StageCtx<'_, '_>) {
        if self.bound {
            ctx.hooks.restore();
            self.bound = false;
        }
    }
}

impl Default for PStippleStage {
    fn default() -> Self {
        Self::new()
    }
}
