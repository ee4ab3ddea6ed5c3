//! Post-shade processing: clip outcodes, guard-band admission, perspective
//! divide, viewport transform, and edge-flag initialization.
//!
//! Runs on every shaded vertex before either the fast emit path or the
//! fixed-function stage chain. The outcode decision here is global per draw
//! call (any nonzero outcode routes the whole draw through the pipeline);
//! the pipeline's clip stage re-tests per primitive.

use crate::prim::{ClipMask, PipeVertex};
use crate::shader::{ShaderInfo, VertexBlock};
use crate::state::{ClipPolicy, Rasterizer, UserClipPlanes, Viewport};
use crate::topology::ReducedPrim;

#[inline]
fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

/// Everything the clip test needs, gathered once per draw.
pub struct ClipTest<'a> {
    pub policy: &'a ClipPolicy,
    pub rast: &'a Rasterizer,
    pub planes: &'a UserClipPlanes,
    pub info: &'a ShaderInfo,
}

impl ClipTest<'_> {
    /// Guard-band multiplier applicable to `prim` (triangles use the main
    /// band; points/lines may use the looser one).
    fn band(&self, prim: ReducedPrim) -> f32 {
        let b = match prim {
            ReducedPrim::Triangles => self.policy.guard_band,
            ReducedPrim::Points | ReducedPrim::Lines => self
                .policy
                .guard_band_points_lines
                .or(self.policy.guard_band),
        };
        b.unwrap_or(1.0).max(1.0)
    }

    /// Clip distance for user plane `i` of `vertex`: the shader-written
    /// clip distance when present, else the plane dot product against the
    /// clip vertex (or position).
    fn user_distance(&self, vertex: &[[f32; 4]], clip_pos: [f32; 4], i: usize) -> f32 {
        if i < self.info.num_written_clipdistance {
            let slot = self.info.clipdist_outputs[i / 4];
            match slot {
                Some(s) => vertex[s][i % 4],
                None => 0.0,
            }
        } else {
            let cv = match self.info.clipvertex_output {
                Some(s) => vertex[s],
                None => clip_pos,
            };
            dot4(self.planes.planes[i], cv)
        }
    }

    /// Outcode for one vertex. `clip_pos` is the pre-divide clip-space
    /// position.
    pub fn outcode(&self, vertex: &[[f32; 4]], clip_pos: [f32; 4], prim: ReducedPrim) -> ClipMask {
        let mut mask = ClipMask::empty();
        let [x, y, z, w] = clip_pos;

        if self.policy.clip_xy {
            let band = self.band(prim);
            let limit = band * w;
            if x > limit {
                mask |= ClipMask::X_POS;
            }
            if x < -limit {
                mask |= ClipMask::X_NEG;
            }
            if y > limit {
                mask |= ClipMask::Y_POS;
            }
            if y < -limit {
                mask |= ClipMask::Y_NEG;
            }
        }
        if self.policy.clip_z {
            let near_limit = if self.rast.clip_halfz { 0.0 } else { -w };
            if z < near_limit {
                mask |= ClipMask::Z_NEAR;
            }
            let far_enabled = !self.rast.depth_clip_near && !self.rast.depth_clip_far_disabled;
            if far_enabled && z > w {
                mask |= ClipMask::Z_FAR;
            }
        }
        if self.policy.clip_user {
            let nr = self
                .planes
                .planes
                .len()
                .max(self.info.num_written_clipdistance);
            for i in 0..nr {
                let d = self.user_distance(vertex, clip_pos, i);
                // NaN distances clip the vertex (nothing is "inside" NaN).
                if !(d >= 0.0) {
                    mask |= ClipMask::user_plane(i);
                }
            }
        }
        mask
    }
}

/// Apply the perspective divide and viewport scale/bias to `pos`, returning
/// the window-space position (w holds 1/w for downstream interpolation).
#[inline]
pub fn viewport_transform(pos: [f32; 4], vp: &Viewport) -> [f32; 4] {
    let oow = 1.0 / pos[3];
    [
        pos[0] * oow * vp.scale[0] + vp.translate[0],
        pos[1] * oow * vp.scale[1] + vp.translate[1],
        pos[2] * oow * vp.scale[2] + vp.translate[2],
        oow,
    ]
}

/// Select the viewport for a vertex from the shader's viewport-index
/// output, clamped into the bound array.
#[inline]
pub fn viewport_index(vertex: &[[f32; 4]], info: &ShaderInfo, num_viewports: usize) -> u8 {
    let idx = match info.viewport_index_output {
        Some(s) => vertex[s][0] as i64,
        None => 0,
    };
    idx.clamp(0, num_viewports.saturating_sub(1) as i64) as u8
}

/// Transform every vertex of `block` in place: `data[pos]` becomes the
/// window-space position. Used by both middle-ends so their outputs are
/// bit-identical where the fast path's preconditions hold.
pub fn transform_block(
    block: &mut VertexBlock,
    info: &ShaderInfo,
    policy: &ClipPolicy,
    viewports: &[Viewport],
) {
    if policy.bypass_viewport {
        return;
    }
    for i in 0..block.count() {
        let vp = viewports[viewport_index(block.vertex(i), info, viewports.len()) as usize];
        let v = block.vertex_mut(i);
        v[info.position_output] = viewport_transform(v[info.position_output], &vp);
    }
}

/// The per-draw clip test over a shaded block: `true` when any vertex
/// fails the (guard-banded) test and the draw must run the full pipeline.
pub fn cliptest_block(block: &VertexBlock, test: &ClipTest<'_>, prim: ReducedPrim) -> bool {
    for i in 0..block.count() {
        let v = block.vertex(i);
        if !test.outcode(v, v[test.info.position_output], prim).is_empty() {
            return true;
        }
    }
    false
}

/// Build pipeline vertices from a shaded block: capture clip-space
/// positions, compute outcodes, apply the viewport transform, and
/// initialize edge flags from the shader's edge-flag output (default true).
pub fn build_pipe_vertices(
    block: &VertexBlock,
    ids: &[u32],
    test: &ClipTest<'_>,
    prim: ReducedPrim,
    policy: &ClipPolicy,
    viewports: &[Viewport],
    total_slots: usize,
) -> Vec<PipeVertex> {
    debug_assert_eq!(block.count(), ids.len());
    let info = test.info;
    let mut out = Vec::with_capacity(block.count());
    for i in 0..block.count() {
        let v = block.vertex(i);
        let clip_pos = v[info.position_output];
        let clipmask = test.outcode(v, clip_pos, prim);
        let vp_index = viewport_index(v, info, viewports.len());
        let edgeflag = match info.edgeflag_output {
            Some(s) => v[s][0] != 0.0,
            None => true,
        };
        let mut data = Vec::with_capacity(total_slots);
        data.extend_from_slice(v);
        data.resize(total_slots, [0.0; 4]);
        if !policy.bypass_viewport {
            data[info.position_output] =
                viewport_transform(clip_pos, &viewports[vp_index as usize]);
        }
        out.push(PipeVertex {
            vertex_id: ids[i],
            clipmask,
            edgeflag,
            viewport_index: vp_index,
            clip_pos,
            data,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with_positions(positions: &[[f32; 4]]) -> VertexBlock {
        let mut b = VertexBlock::new(1);
        for p in positions {
            b.push(&[*p]);
        }
        b
    }

    fn default_test<'a>(
        policy: &'a ClipPolicy,
        rast: &'a Rasterizer,
        planes: &'a UserClipPlanes,
        info: &'a ShaderInfo,
    ) -> ClipTest<'a> {
        ClipTest {
            policy,
            rast,
            planes,
            info,
        }
    }

    #[test]
    fn interior_vertex_has_empty_outcode() {
        let policy = ClipPolicy::default();
        let rast = Rasterizer::default();
        let planes = UserClipPlanes::default();
        let info = ShaderInfo::simple(1);
        let t = default_test(&policy, &rast, &planes, &info);
        let m = t.outcode(&[[0.0; 4]], [0.5, -0.5, 0.0, 1.0], ReducedPrim::Triangles);
        assert!(m.is_empty());
    }

    #[test]
    fn guard_band_admits_offscreen_xy() {
        let mut policy = ClipPolicy::default();
        let rast = Rasterizer::default();
        let planes = UserClipPlanes::default();
        let info = ShaderInfo::simple(1);

        let pos = [1.5, 0.0, 0.0, 1.0];
        let t = default_test(&policy, &rast, &planes, &info);
        assert_eq!(
            t.outcode(&[[0.0; 4]], pos, ReducedPrim::Triangles),
            ClipMask::X_POS
        );

        policy.guard_band = Some(2.0);
        let t = default_test(&policy, &rast, &planes, &info);
        assert!(t.outcode(&[[0.0; 4]], pos, ReducedPrim::Triangles).is_empty());
    }

    #[test]
    fn points_may_use_looser_band_than_triangles() {
        let mut policy = ClipPolicy::default();
        policy.guard_band = Some(1.2);
        policy.guard_band_points_lines = Some(4.0);
        let rast = Rasterizer::default();
        let planes = UserClipPlanes::default();
        let info = ShaderInfo::simple(1);
        let t = default_test(&policy, &rast, &planes, &info);

        let pos = [3.0, 0.0, 0.0, 1.0];
        assert!(!t.outcode(&[[0.0; 4]], pos, ReducedPrim::Triangles).is_empty());
        assert!(t.outcode(&[[0.0; 4]], pos, ReducedPrim::Points).is_empty());
    }

    #[test]
    fn halfz_moves_near_plane() {
        let mut rast = Rasterizer::default();
        let policy = ClipPolicy::default();
        let planes = UserClipPlanes::default();
        let info = ShaderInfo::simple(1);

        let pos = [0.0, 0.0, -0.5, 1.0];
        let t = default_test(&policy, &rast, &planes, &info);
        assert!(t.outcode(&[[0.0; 4]], pos, ReducedPrim::Triangles).is_empty());

        rast.clip_halfz = true;
        let t = default_test(&policy, &rast, &planes, &info);
        assert_eq!(
            t.outcode(&[[0.0; 4]], pos, ReducedPrim::Triangles),
            ClipMask::Z_NEAR
        );
    }

    #[test]
    fn user_plane_outcode_uses_plane_bit() {
        let policy = ClipPolicy::default();
        let rast = Rasterizer::default();
        let planes = UserClipPlanes {
            // Half space x >= 0.25 (in clip space, w = 1).
            planes: vec![[1.0, 0.0, 0.0, -0.25]],
        };
        let info = ShaderInfo::simple(1);
        let t = default_test(&policy, &rast, &planes, &info);
        let m = t.outcode(&[[0.0; 4]], [0.0, 0.0, 0.0, 1.0], ReducedPrim::Triangles);
        assert_eq!(m, ClipMask::user_plane(0));
    }

    #[test]
    fn viewport_transform_divides_and_scales() {
        let vp = Viewport {
            scale: [100.0, 50.0, 0.5],
            translate: [100.0, 50.0, 0.5],
        };
        let w = viewport_transform([1.0, 0.0, 0.0, 2.0], &vp);
        assert_eq!(w[0], 150.0);
        assert_eq!(w[1], 50.0);
        assert_eq!(w[2], 0.5);
        assert_eq!(w[3], 0.5);
    }

    #[test]
    fn cliptest_block_flags_any_outside_vertex() {
        let policy = ClipPolicy::default();
        let rast = Rasterizer::default();
        let planes = UserClipPlanes::default();
        let info = ShaderInfo::simple(1);
        let t = default_test(&policy, &rast, &planes, &info);

        let inside = block_with_positions(&[[0.0, 0.0, 0.0, 1.0], [0.5, 0.5, 0.0, 1.0]]);
        assert!(!cliptest_block(&inside, &t, ReducedPrim::Triangles));

        let straddling = block_with_positions(&[[0.0, 0.0, 0.0, 1.0], [1.5, 0.0, 0.0, 1.0]]);
        assert!(cliptest_block(&straddling, &t, ReducedPrim::Triangles));
    }

    #[test]
    fn transform_block_respects_bypass() {
        let mut policy = ClipPolicy::default();
        policy.bypass_viewport = true;
        let info = ShaderInfo::simple(1);
        let mut b = block_with_positions(&[[2.0, 4.0, 6.0, 2.0]]);
        transform_block(&mut b, &info, &policy, &[Viewport::default()]);
        assert_eq!(b.vertex(0)[0], [2.0, 4.0, 6.0, 2.0]);
    }
}
