//! Geometric clipping: Sutherland–Hodgman polygon clipping against the
//! frustum planes and user planes, homogeneous segment clipping for lines,
//! and inside/outside rejection for points.
//!
//! Only planes present in the primitive's combined outcode are clipped
//! against, so a primitive whose vertices all carry empty outcodes passes
//! through untouched (same vertices, same attributes).

use tracing::warn;

use super::{forward, tri_determinant, PipelineParams, Stage, StageCtx};
use crate::postshade::viewport_transform;
use crate::prim::{ClipMask, PipePrim, PipeVertex, PrimFlags};
use crate::state::MAX_USER_CLIP_PLANES;

/// Fixed scratch capacity: a triangle clipped by every plane can gain one
/// vertex per plane.
const MAX_POLY_VERTS: usize = 6 + MAX_USER_CLIP_PLANES + 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Plane {
    XPos,
    XNeg,
    YPos,
    YNeg,
    ZFar,
    ZNear,
    User(usize),
}

impl Plane {
    fn mask(self) -> ClipMask {
        match self {
            Plane::XPos => ClipMask::X_POS,
            Plane::XNeg => ClipMask::X_NEG,
            Plane::YPos => ClipMask::Y_POS,
            Plane::YNeg => ClipMask::Y_NEG,
            Plane::ZFar => ClipMask::Z_FAR,
            Plane::ZNear => ClipMask::Z_NEAR,
            Plane::User(i) => ClipMask::user_plane(i),
        }
    }
}

fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

/// Signed distance of a vertex from `plane`; >= 0 is inside.
fn plane_dist(params: &PipelineParams<'_>, v: &PipeVertex, plane: Plane) -> f32 {
    let [x, y, z, w] = v.clip_pos;
    match plane {
        Plane::XPos => w - x,
        Plane::XNeg => w + x,
        Plane::YPos => w - y,
        Plane::YNeg => w + y,
        Plane::ZFar => w - z,
        Plane::ZNear => {
            if params.rast.clip_halfz {
                z
            } else {
                w + z
            }
        }
        Plane::User(i) => {
            let info = params.info;
            if i < info.num_written_clipdistance {
                match info.clipdist_outputs[i / 4] {
                    Some(slot) => v.data[slot][i % 4],
                    None => 0.0,
                }
            } else {
                let cv = match info.clipvertex_output {
                    Some(slot) => v.data[slot],
                    None => v.clip_pos,
                };
                dot4(params.planes.planes[i], cv)
            }
        }
    }
}

/// Interpolate a new vertex at parameter `t` along `a -> b`. Every
/// attribute (including the clip-space position) is linearly interpolated;
/// the window position is then rederived through the viewport transform.
fn interp(
    params: &PipelineParams<'_>,
    a: &PipeVertex,
    b: &PipeVertex,
    t: f32,
    provoking: &PipeVertex,
) -> PipeVertex {
    let lerp4 = |p: [f32; 4], q: [f32; 4]| -> [f32; 4] {
        [
            p[0] + t * (q[0] - p[0]),
            p[1] + t * (q[1] - p[1]),
            p[2] + t * (q[2] - p[2]),
            p[3] + t * (q[3] - p[3]),
        ]
    };
    let clip_pos = lerp4(a.clip_pos, b.clip_pos);
    let mut data: Vec<[f32; 4]> = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(p, q)| lerp4(*p, *q))
        .collect();
    let pos = params.info.position_output;
    data[pos] = if params.policy.bypass_viewport {
        clip_pos
    } else {
        viewport_transform(clip_pos, &params.viewports[provoking.viewport_index as usize])
    };
    PipeVertex {
        vertex_id: u32::MAX,
        clipmask: ClipMask::empty(),
        edgeflag: true,
        viewport_index: provoking.viewport_index,
        clip_pos,
        data,
    }
}

pub struct ClipStage {
    planes: Vec<Plane>,
    planes_built: bool,
    warned_overflow: bool,
}

impl ClipStage {
    pub fn new() -> Self {
        Self {
            planes: Vec::new(),
            planes_built: false,
            warned_overflow: false,
        }
    }

    fn active_planes(&mut self, params: &PipelineParams<'_>) -> &[Plane] {
        if !self.planes_built {
            if params.policy.clip_xy {
                self.planes
                    .extend_from_slice(&[Plane::XPos, Plane::XNeg, Plane::YPos, Plane::YNeg]);
            }
            if params.policy.clip_z {
                self.planes.push(Plane::ZNear);
                if !params.rast.depth_clip_near && !params.rast.depth_clip_far_disabled {
                    self.planes.push(Plane::ZFar);
                }
            }
            if params.policy.clip_user {
                let nr = params
                    .planes
                    .planes
                    .len()
                    .max(params.info.num_written_clipdistance);
                for i in 0..nr {
                    self.planes.push(Plane::User(i));
                }
            }
            self.planes_built = true;
        }
        &self.planes
    }

    pub fn process(&mut self, ctx: &mut StageCtx<'_, '_>, rest: &mut [Stage], prim: PipePrim) {
        ctx.stats.clipper_in += 1;
        match prim {
            PipePrim::Point { v, flags } => {
                // Points are not geometrically split; outside means gone.
                if v.clipmask.is_empty() {
                    ctx.stats.clipper_out += 1;
                    forward(rest, ctx, PipePrim::Point { v, flags });
                }
            }
            PipePrim::Line { v, flags } => self.clip_line(ctx, rest, *v, flags),
            PipePrim::Tri { v, flags, det } => self.clip_tri(ctx, rest, *v, flags, det),
        }
    }

    fn clip_line(
        &mut self,
        ctx: &mut StageCtx<'_, '_>,
        rest: &mut [Stage],
        v: [PipeVertex; 2],
        flags: PrimFlags,
    ) {
        let combined = v[0].clipmask | v[1].clipmask;
        if combined.is_empty() {
            ctx.stats.clipper_out += 1;
            forward(rest, ctx, PipePrim::Line { v: Box::new(v), flags });
            return;
        }
        if !(v[0].clipmask & v[1].clipmask).is_empty() {
            return; // Both outside the same plane.
        }

        let params = ctx.params;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        for &plane in self.active_planes(params) {
            if !combined.intersects(plane.mask()) {
                continue;
            }
            let d0 = plane_dist(params, &v[0], plane);
            let d1 = plane_dist(params, &v[1], plane);
            if d0 < 0.0 && d1 < 0.0 {
                return;
            }
            if d0 < 0.0 {
                t0 = t0.max(d0 / (d0 - d1));
            } else if d1 < 0.0 {
                t1 = t1.min(d0 / (d0 - d1));
            }
            if t0 > t1 {
                return;
            }
        }

        let provoking = if params.rast.flatshade_first { &v[0] } else { &v[1] };
        let a = if t0 > 0.0 {
            interp(params, &v[0], &v[1], t0, provoking)
        } else {
            v[0].clone()
        };
        let b = if t1 < 1.0 {
            interp(params, &v[0], &v[1], t1, provoking)
        } else {
            v[1].clone()
        };
        ctx.stats.clipper_out += 1;
        forward(
            rest,
            ctx,
            PipePrim::Line {
                v: Box::new([a, b]),
                flags,
            },
        );
    }

    fn clip_tri(
        &mut self,
        ctx: &mut StageCtx<'_, '_>,
        rest: &mut [Stage],
        v: [PipeVertex; 3],
        flags: PrimFlags,
        det: f32,
    ) {
        let combined = v[0].clipmask | v[1].clipmask | v[2].clipmask;
        if combined.is_empty() {
            ctx.stats.clipper_out += 1;
            forward(
                rest,
                ctx,
                PipePrim::Tri {
                    v: Box::new(v),
                    flags,
                    det,
                },
            );
            return;
        }
        if !(v[0].clipmask & v[1].clipmask & v[2].clipmask).is_empty() {
            return; // Trivially rejected.
        }

        let params = ctx.params;
        let provoking = if params.rast.flatshade_first {
            v[0].clone()
        } else {
            v[2].clone()
        };

        // Polygon vertices, each tagged with the flag of the edge that
        // starts at it.
        let mut poly: Vec<(PipeVertex, bool)> = Vec::with_capacity(MAX_POLY_VERTS);
        let [v0, v1, v2] = v;
        poly.push((v0, flags.contains(PrimFlags::EDGE_0)));
        poly.push((v1, flags.contains(PrimFlags::EDGE_1)));
        poly.push((v2, flags.contains(PrimFlags::EDGE_2)));

        let planes = self.active_planes(params).to_vec();
        for plane in planes {
            if !combined.intersects(plane.mask()) {
                continue;
            }
            let mut out: Vec<(PipeVertex, bool)> = Vec::with_capacity(MAX_POLY_VERTS);
            for i in 0..poly.len() {
                let (cur, cur_flag) = &poly[i];
                let (next, _) = &poly[(i + 1) % poly.len()];
                let d0 = plane_dist(params, cur, plane);
                let d1 = plane_dist(params, next, plane);
                if d0 >= 0.0 {
                    out.push((cur.clone(), *cur_flag));
                    if d1 < 0.0 {
                        // Leaving: trim the edge, then start a new boundary
                        // edge along the clip plane.
                        let t = d0 / (d0 - d1);
                        out.push((interp(params, cur, next, t, &provoking), true));
                    }
                } else if d1 >= 0.0 {
                    // Entering: the trimmed remainder of this edge keeps
                    // its original flag.
                    let t = d0 / (d0 - d1);
                    out.push((interp(params, cur, next, t, &provoking), *cur_flag));
                }
            }
            if out.len() > MAX_POLY_VERTS {
                if !self.warned_overflow {
                    warn!(
                        verts = out.len(),
                        "clipped polygon exceeded scratch capacity; dropping primitive"
                    );
                    self.warned_overflow = true;
                }
                return;
            }
            poly = out;
            if poly.len() < 3 {
                return; // Degenerate output.
            }
        }

        // Re-fan the clipped polygon into triangles (provoking vertex kept
        // at the fan pivot's slot position by construction: v[0] of the
        // polygon is the original v[0]).
        let n = poly.len();
        for k in 0..n - 2 {
            let mut f = PrimFlags::empty();
            if k == 0 && poly[0].1 {
                f |= PrimFlags::EDGE_0;
            }
            if poly[k + 1].1 {
                f |= PrimFlags::EDGE_1;
            }
            if k == n - 3 && poly[k + 2].1 {
                f |= PrimFlags::EDGE_2;
            }
            let tri = [
                poly[0].0.clone(),
                poly[k + 1].0.clone(),
                poly[k + 2].0.clone(),
            ];
            let det = tri_determinant(&tri);
            ctx.stats.clipper_out += 1;
            forward(
                rest,
                ctx,
                PipePrim::Tri {
                    v: Box::new(tri),
                    flags: f | (flags & PrimFlags::RESET_STIPPLE),
                    det,
                },
            );
        }
    }
}

impl Default for ClipStage {
    fn default() -> Self {
        Self::new()
    }
}
