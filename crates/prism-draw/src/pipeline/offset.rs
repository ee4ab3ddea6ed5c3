//! Polygon offset: slope-scaled + constant depth bias applied to triangle
//! window-space Z before unfilled decomposition.

use super::cull::is_front;
use super::{forward, PipePrim, Stage, StageCtx};
use crate::state::{DepthFormat, FillMode};

/// Minimum resolvable depth difference for the bound depth buffer.
///
/// Fixed-point: one LSB. Floating-point: depends on the magnitude of Z
/// itself — one ULP at the triangle's maximum depth.
fn minimum_resolvable_depth(format: DepthFormat, max_z: f32) -> f32 {
    match format {
        DepthFormat::Unorm { bits } => 1.0 / (((1u64 << bits.min(63)) - 1) as f32),
        DepthFormat::Float => {
            // 2^(exp(max_z) - 23): the f32 mantissa step at that magnitude.
            let m = max_z.abs();
            if m == 0.0 {
                f32::MIN_POSITIVE
            } else {
                m * f32::EPSILON
            }
        }
    }
}

pub struct OffsetStage;

impl OffsetStage {
    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], mut prim: PipePrim) {
        if let PipePrim::Tri { v, det, flags: _ } = &mut prim {
            let rast = ctx.params.rast;
            // The offset applies per the face's eventual fill mode.
            let front = is_front(*det, rast.front_ccw);
            let mode = if front { rast.fill_front } else { rast.fill_back };
            let enabled = match mode {
                FillMode::Fill => rast.offset_tri,
                FillMode::Line => rast.offset_line,
                FillMode::Point => rast.offset_point,
            };
            if enabled {
                let pos = ctx.params.info.position_output;
                let p0 = v[0].data[pos];
                let p1 = v[1].data[pos];
                let p2 = v[2].data[pos];

                // Z gradient over window X/Y from the triangle's plane.
                let ex1 = p1[0] - p0[0];
                let ey1 = p1[1] - p0[1];
                let ez1 = p1[2] - p0[2];
                let ex2 = p2[0] - p0[0];
                let ey2 = p2[1] - p0[1];
                let ez2 = p2[2] - p0[2];
                let area = ex1 * ey2 - ex2 * ey1;
                let (dzdx, dzdy) = if area != 0.0 {
                    let inv = 1.0 / area;
                    ((ez1 * ey2 - ez2 * ey1) * inv, (ex1 * ez2 - ex2 * ez1) * inv)
                } else {
                    (0.0, 0.0)
                };
                let slope = dzdx.abs().max(dzdy.abs());

                let max_z = p0[2].abs().max(p1[2].abs()).max(p2[2].abs());
                let mrd = minimum_resolvable_depth(ctx.params.caps.depth_format, max_z);

                let mut bias = rast.offset_units * mrd + slope * rast.offset_scale;
                if rast.offset_clamp > 0.0 {
                    bias = bias.min(rast.offset_clamp);
                } else if rast.offset_clamp < 0.0 {
                    bias = bias.max(rast.offset_clamp);
                }
                for vert in v.iter_mut() {
                    vert.data[pos][2] += bias;
                }
            }
        }
        forward(rest, ctx, prim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unorm_mrd_is_one_lsb() {
        assert_eq!(
            minimum_resolvable_depth(DepthFormat::Unorm { bits: 16 }, 0.5),
            1.0 / 65535.0
        );
        let mrd24 = minimum_resolvable_depth(DepthFormat::Unorm { bits: 24 }, 0.5);
        assert!(mrd24 < 1.0 / 16_000_000.0);
    }

    #[test]
    fn float_mrd_scales_with_depth() {
        let near = minimum_resolvable_depth(DepthFormat::Float, 0.01);
        let far = minimum_resolvable_depth(DepthFormat::Float, 1000.0);
        assert!(near < far);
        assert_eq!(minimum_resolvable_depth(DepthFormat::Float, 0.0), f32::MIN_POSITIVE);
    }
}
