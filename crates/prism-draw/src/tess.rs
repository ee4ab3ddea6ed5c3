//! Tessellation adapter: tess-control invocation per output patch vertex,
//! equal-spacing domain generation, and tess-eval invocation per generated
//! point. The result is an owned vertex block plus index list the
//! middle-end feeds straight into post-shade processing.

use tracing::debug;

use crate::error::DrawError;
use crate::shader::{Constants, TessCtrlShader, TessDomain, TessEvalShader, TessLevels, VertexBlock};
use crate::topology::PrimitiveTopology;

/// Hard clamp on tessellation levels.
pub const MAX_TESS_LEVEL: f32 = 64.0;

/// Everything tessellation needs besides the fetched vertices.
pub struct Tessellator<'a> {
    pub tcs: Option<&'a dyn TessCtrlShader>,
    pub tes: &'a dyn TessEvalShader,
    /// Input patch size (from context state, not the shaders).
    pub patch_vertices: u32,
    /// Fallback levels for components no TCS invocation wrote.
    pub default_outer: [f32; 4],
    pub default_inner: [f32; 2],
}

/// Tessellation output, handed off by value.
#[derive(Clone, Debug)]
pub struct TessRun {
    pub topology: PrimitiveTopology,
    pub vertices: VertexBlock,
    pub indices: Vec<u32>,
}

/// An equal-spacing level: rounded up to an integer segment count.
/// Non-positive levels cull the patch.
fn segments(level: f32) -> Option<u32> {
    if !(level > 0.0) {
        return None;
    }
    Some(level.min(MAX_TESS_LEVEL).ceil() as u32)
}

impl Tessellator<'_> {
    fn resolve_levels(&self, written: &TessLevels) -> ([f32; 4], [f32; 2]) {
        let mut outer = self.default_outer;
        let mut inner = self.default_inner;
        for (dst, src) in outer.iter_mut().zip(written.outer) {
            if let Some(v) = src {
                *dst = v;
            }
        }
        for (dst, src) in inner.iter_mut().zip(written.inner) {
            if let Some(v) = src {
                *dst = v;
            }
        }
        (outer, inner)
    }

    /// Generate domain points and connectivity for one patch, appending to
    /// the run. Returns `false` when the levels cull the patch.
    fn tessellate_patch(
        &self,
        patch: &[&[[f32; 4]]],
        levels: &TessLevels,
        constants: &Constants<'_>,
        run: &mut TessRun,
    ) -> bool {
        let (outer, inner) = self.resolve_levels(levels);
        let base = run.vertices.count() as u32;
        let point_mode = self.tes.point_mode();

        let mut coords: Vec<[f32; 2]> = Vec::new();
        let mut tris: Vec<[u32; 3]> = Vec::new();
        let mut lines: Vec<[u32; 2]> = Vec::new();

        match self.tes.domain() {
            TessDomain::Triangles => {
                // Equal spacing with one effective level: the maximum of the
                // three outer levels and the inner level.
                let level = outer[0].max(outer[1]).max(outer[2]).max(inner[0]);
                let Some(n) = segments(level) else { return false };
                // Barycentric grid rows: row i holds n - i + 1 points.
                let mut row_start = vec![0u32; (n + 2) as usize];
                let mut next = 0u32;
                for i in 0..=n {
                    row_start[i as usize] = next;
                    for j in 0..=(n - i) {
                        coords.push([j as f32 / n as f32, i as f32 / n as f32]);
                        next += 1;
                    }
                }
                row_start[(n + 1) as usize] = next;
                for i in 0..n {
                    let r0 = row_start[i as usize];
                    let r1 = row_start[(i + 1) as usize];
                    let w = n - i;
                    for j in 0..w {
                        tris.push([r0 + j, r0 + j + 1, r1 + j]);
                        if j + 1 < w {
                            tris.push([r0 + j + 1, r1 + j + 1, r1 + j]);
                        }
                    }
                }
            }
            TessDomain::Quads => {
                let nu = match segments(outer[0].max(outer[2]).max(inner[0])) {
                    Some(n) => n,
                    None => return false,
                };
                let nv = match segments(outer[1].max(outer[3]).max(inner[1])) {
                    Some(n) => n,
                    None => return false,
                };
                for vi in 0..=nv {
                    for ui in 0..=nu {
                        coords.push([ui as f32 / nu as f32, vi as f32 / nv as f32]);
                    }
                }
                let stride = nu + 1;
                for vi in 0..nv {
                    for ui in 0..nu {
                        let a = vi * stride + ui;
                        let b = a + 1;
                        let c = a + stride;
                        let d = c + 1;
                        tris.push([a, b, d]);
                        tris.push([a, d, c]);
                    }
                }
            }
            TessDomain::Isolines => {
                let num_lines = match segments(outer[0]) {
                    Some(n) => n,
                    None => return false,
                };
                let segs = match segments(outer[1]) {
                    Some(n) => n,
                    None => return false,
                };
                // Isolines cover v in [0, 1) — no line at v = 1.
                for li in 0..num_lines {
                    let v = li as f32 / num_lines as f32;
                    let row = coords.len() as u32;
                    for s in 0..=segs {
                        coords.push([s as f32 / segs as f32, v]);
                    }
                    for s in 0..segs {
                        lines.push([row + s, row + s + 1]);
                    }
                }
            }
        }

        for coord in &coords {
            let out = run.vertices.push_uninit();
            self.tes.run(patch, *coord, constants, out);
        }
        if point_mode {
            run.indices.extend(base..base + coords.len() as u32);
        } else if self.tes.domain() == TessDomain::Isolines {
            for [a, b] in lines {
                run.indices.extend([base + a, base + b]);
            }
        } else {
            for [a, b, c] in tris {
                run.indices.extend([base + a, base + b, base + c]);
            }
        }
        true
    }
}

/// Run the tessellation stages over a fetched batch. `elements[i]` maps
/// batch position `i` to a vertex in `input`; trailing vertices that do
/// not complete a patch are ignored.
pub fn run_tessellation(
    t: &Tessellator<'_>,
    input: &VertexBlock,
    elements: &[u32],
    constants: &Constants<'_>,
) -> Result<TessRun, DrawError> {
    if t.patch_vertices == 0 {
        return Err(DrawError::EmptyPatch);
    }
    let in_size = t.patch_vertices as usize;
    let out_slots = t.tes.info().num_outputs;
    let topology = if t.tes.point_mode() {
        PrimitiveTopology::PointList
    } else {
        match t.tes.domain() {
            TessDomain::Isolines => PrimitiveTopology::LineList,
            _ => PrimitiveTopology::TriangleList,
        }
    };
    let mut run = TessRun {
        topology,
        vertices: VertexBlock::new(out_slots),
        indices: Vec::new(),
    };

    let num_patches = elements.len() / in_size;
    debug!(num_patches, domain = ?t.tes.domain(), "tessellation dispatch");

    let mut in_refs: Vec<&[[f32; 4]]> = Vec::with_capacity(in_size);
    for p in 0..num_patches {
        in_refs.clear();
        for &e in &elements[p * in_size..(p + 1) * in_size] {
            in_refs.push(input.vertex(e as usize));
        }

        let mut levels = TessLevels::default();
        match t.tcs {
            Some(tcs) => {
                let out_count = tcs.output_patch_vertices();
                if out_count == 0 {
                    return Err(DrawError::EmptyPatch);
                }
                let mut out_patch = VertexBlock::new(tcs.info().num_outputs);
                for ov in 0..out_count {
                    let slots = out_patch.push_uninit();
                    tcs.run(&in_refs, ov, constants, slots, &mut levels);
                }
                let patch_refs: Vec<&[[f32; 4]]> =
                    (0..out_patch.count()).map(|i| out_patch.vertex(i)).collect();
                t.tessellate_patch(&patch_refs, &levels, constants, &mut run);
            }
            None => {
                t.tessellate_patch(&in_refs, &levels, constants, &mut run);
            }
        }
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderInfo;

    /// TES that places vertices at the domain coordinate.
    struct DomainTes {
        info: ShaderInfo,
        domain: TessDomain,
        point_mode: bool,
    }

    impl TessEvalShader for DomainTes {
        fn info(&self) -> &ShaderInfo {
            &self.info
        }
        fn domain(&self) -> TessDomain {
            self.domain
        }
        fn point_mode(&self) -> bool {
            self.point_mode
        }
        fn run(
            &self,
            _patch: &[&[[f32; 4]]],
            coord: [f32; 2],
            _constants: &Constants<'_>,
            out: &mut [[f32; 4]],
        ) {
            out[0] = [coord[0], coord[1], 0.0, 1.0];
        }
    }

    fn patch_block(count: usize) -> (VertexBlock, Vec<u32>) {
        let mut b = VertexBlock::new(1);
        for i in 0..count {
            b.push(&[[i as f32, 0.0, 0.0, 1.0]]);
        }
        (b, (0..count as u32).collect())
    }

    #[test]
    fn quad_domain_level_one_is_two_triangles() {
        let tes = DomainTes {
            info: ShaderInfo::simple(1),
            domain: TessDomain::Quads,
            point_mode: false,
        };
        let t = Tessellator {
            tcs: None,
            tes: &tes,
            patch_vertices: 4,
            default_outer: [1.0; 4],
            default_inner: [1.0; 2],
        };
        let (block, elements) = patch_block(4);
        let run = run_tessellation(&t, &block, &elements, &Constants::default()).unwrap();
        assert_eq!(run.topology, PrimitiveTopology::TriangleList);
        assert_eq!(run.vertices.count(), 4);
        assert_eq!(run.indices.len(), 6);
    }

    #[test]
    fn triangle_domain_counts() {
        let tes = DomainTes {
            info: ShaderInfo::simple(1),
            domain: TessDomain::Triangles,
            point_mode: false,
        };
        let t = Tessellator {
            tcs: None,
            tes: &tes,
            patch_vertices: 3,
            default_outer: [2.0; 4],
            default_inner: [2.0; 2],
        };
        let (block, elements) = patch_block(3);
        let run = run_tessellation(&t, &block, &elements, &Constants::default()).unwrap();
        // Level 2: 6 boundary + 0 interior = 6 vertices, 4 triangles.
        assert_eq!(run.vertices.count(), 6);
        assert_eq!(run.indices.len(), 12);
    }

    #[test]
    fn isolines_leave_out_v_equals_one() {
        let tes = DomainTes {
            info: ShaderInfo::simple(1),
            domain: TessDomain::Isolines,
            point_mode: false,
        };
        let t = Tessellator {
            tcs: None,
            tes: &tes,
            patch_vertices: 2,
            default_outer: [2.0, 4.0, 0.0, 0.0],
            default_inner: [0.0; 2],
        };
        let (block, elements) = patch_block(2);
        let run = run_tessellation(&t, &block, &elements, &Constants::default()).unwrap();
        assert_eq!(run.topology, PrimitiveTopology::LineList);
        // 2 lines of 4 segments: 10 vertices, 8 segments.
        assert_eq!(run.vertices.count(), 10);
        assert_eq!(run.indices.len(), 16);
        let max_v = (0..run.vertices.count())
            .map(|i| run.vertices.vertex(i)[0][1])
            .fold(0.0f32, f32::max);
        assert!(max_v < 1.0);
    }

    #[test]
    fn zero_outer_level_culls_patch() {
        let tes = DomainTes {
            info: ShaderInfo::simple(1),
            domain: TessDomain::Triangles,
            point_mode: false,
        };
        let t = Tessellator {
            tcs: None,
            tes: &tes,
            patch_vertices: 3,
            default_outer: [0.0; 4],
            default_inner: [0.0; 2],
        };
        let (block, elements) = patch_block(3);
        let run = run_tessellation(&t, &block, &elements, &Constants::default()).unwrap();
        assert!(run.indices.is_empty());
    }

    #[test]
    fn tcs_levels_override_defaults() {
        struct LevelTcs(ShaderInfo);
        impl TessCtrlShader for LevelTcs {
            fn info(&self) -> &ShaderInfo {
                &self.0
            }
            fn output_patch_vertices(&self) -> u32 {
                3
            }
            fn run(
                &self,
                patch: &[&[[f32; 4]]],
                out_vertex: u32,
                _constants: &Constants<'_>,
                out: &mut [[f32; 4]],
                levels: &mut TessLevels,
            ) {
                out[0] = patch[out_vertex as usize][0];
                levels.outer = [Some(1.0), Some(1.0), Some(1.0), None];
                levels.inner = [Some(1.0), None];
            }
        }
        let tes = DomainTes {
            info: ShaderInfo::simple(1),
            domain: TessDomain::Triangles,
            point_mode: false,
        };
        let tcs = LevelTcs(ShaderInfo::simple(1));
        let t = Tessellator {
            tcs: Some(&tcs),
            tes: &tes,
            patch_vertices: 3,
            // Defaults would cull; the TCS writes live levels.
            default_outer: [0.0; 4],
            default_inner: [0.0; 2],
        };
        let (block, elements) = patch_block(3);
        let run = run_tessellation(&t, &block, &elements, &Constants::default()).unwrap();
        // Level 1: one triangle.
        assert_eq!(run.vertices.count(), 3);
        assert_eq!(run.indices, vec![0, 1, 2]);
    }
}
