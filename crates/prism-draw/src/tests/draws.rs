//! End-to-end draw tests through [`DrawContext`] against the capture sink.

use pretty_assertions::assert_eq;

use super::util::{basic_context, draw_verts, no_clip, pos_buffer, SlotVs};
use crate::backend::{CaptureSink, CapturedDrawKind};
use crate::frontend::{DrawInfo, DrawRange, IndexSlice};
use crate::shader::{
    Constants, GeometryShader, GsEmit, GsInputPrim, GsOutputPrim, MeshOutput, MeshShader,
    ShaderInfo, TessDomain, TessEvalShader, VertexBlock,
};
use crate::state::{ClipPolicy, VertexElement};
use crate::stream_output::{SoDeclaration, SoLayout, SoTarget};
use crate::topology::PrimitiveTopology;
use crate::vertex::{VertexBuffers, VertexFormat};
use crate::{DrawContext, DrawError, FlushReason};

#[test]
fn missing_vertex_shader_is_an_error() {
    let mut ctx = DrawContext::new();
    let mut sink = CaptureSink::new();
    let err = draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::PointList,
        &[[0.0, 0.0, 0.0, 1.0]],
    )
    .unwrap_err();
    assert_eq!(err, DrawError::MissingVertexShader);
}

#[test]
fn fast_path_emits_arrays_with_transformed_positions() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::TriangleList,
        &[
            [0.0, 0.0, 0.0, 1.0],
            [2.0, 0.0, 0.0, 2.0],
            [0.0, 4.0, 0.0, 4.0],
        ],
    )
    .unwrap();

    assert_eq!(sink.draws.len(), 1);
    let d = &sink.draws[0];
    assert_eq!(d.topology, PrimitiveTopology::TriangleList);
    assert_eq!(d.kind, CapturedDrawKind::Arrays { start: 0, count: 3 });
    // Perspective divide applied; w holds 1/w.
    assert_eq!(d.vertex(1), &[1.0, 0.0, 0.0, 0.5]);
    assert_eq!(d.vertex(2), &[0.0, 1.0, 0.0, 0.25]);
}

#[test]
fn partial_trailing_primitive_is_trimmed() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    let mut sink = CaptureSink::new();
    let v = [[0.0, 0.0, 0.0, 1.0]; 5];
    draw_verts(&mut ctx, &mut sink, PrimitiveTopology::TriangleList, &v).unwrap();
    assert_eq!(sink.draws.len(), 1);
    assert_eq!(
        sink.draws[0].kind,
        CapturedDrawKind::Arrays { start: 0, count: 3 }
    );
}

#[test]
fn interior_clip_test_draw_is_emitted_wholesale() {
    let mut ctx = basic_context();
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::TriangleStrip,
        &[
            [0.0, 0.0, 0.0, 1.0],
            [0.5, 0.0, 0.0, 1.0],
            [0.0, 0.5, 0.0, 1.0],
            [0.5, 0.5, 0.0, 1.0],
        ],
    )
    .unwrap();
    assert_eq!(sink.draws.len(), 1);
    let d = &sink.draws[0];
    // Nothing failed the clip test: the block lands with its topology and
    // element list intact, and the stage chain never runs.
    assert_eq!(d.topology, PrimitiveTopology::TriangleStrip);
    assert_eq!(d.kind, CapturedDrawKind::Elements(vec![0, 1, 2, 3]));
    let stats = ctx.stats();
    assert_eq!(stats.clipper_in, 0);
    assert_eq!(stats.prims_in, 2);
    assert_eq!(stats.prims_out, 2);
}

#[test]
fn straddling_clip_test_draw_routes_through_the_chain() {
    let mut ctx = basic_context();
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::TriangleStrip,
        &[
            [0.0, 0.0, 0.0, 1.0],
            [1.5, 0.0, 0.0, 1.0],
            [0.0, 0.5, 0.0, 1.0],
        ],
    )
    .unwrap();
    assert!(ctx.stats().clipper_in > 0);
    assert_eq!(sink.draws[0].topology, PrimitiveTopology::TriangleList);
}

#[test]
fn flush_reports_statistics() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::PointList,
        &[[0.0, 0.0, 0.0, 1.0]],
    )
    .unwrap();
    let before = sink.stats_reports.len();
    ctx.flush(&mut sink, FlushReason::BackendFlush);
    assert_eq!(sink.stats_reports.len(), before + 1);
    assert_eq!(sink.stats_reports.last().unwrap().draws, 1);
}

#[test]
fn indexed_draw_with_restart_matches_separate_strips() {
    let verts: Vec<[f32; 4]> = (0..8).map(|i| [i as f32, 0.0, 0.0, 1.0]).collect();
    let buf = pos_buffer(&verts);
    let bufs_inner = [&buf[..]];
    let buffers = VertexBuffers {
        buffers: &bufs_inner,
    };

    let restart_indices: Vec<u16> = vec![0, 1, 2, 3, u16::MAX, 4, 5, 6, 7];
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    let mut with_restart = CaptureSink::new();
    ctx.draw(
        &mut with_restart,
        &buffers,
        &Constants::default(),
        &DrawInfo {
            topology: PrimitiveTopology::TriangleStrip,
            indices: Some(IndexSlice::U16(&restart_indices)),
            restart_index: Some(u16::MAX as u32),
            ..Default::default()
        },
        &[DrawRange { start: 0, count: 9 }],
    )
    .unwrap();

    let mut ctx2 = basic_context();
    ctx2.set_clip_policy(no_clip());
    let mut separate = CaptureSink::new();
    for idx in [&[0u16, 1, 2, 3][..], &[4, 5, 6, 7][..]] {
        ctx2.draw(
            &mut separate,
            &buffers,
            &Constants::default(),
            &DrawInfo {
                topology: PrimitiveTopology::TriangleStrip,
                indices: Some(IndexSlice::U16(idx)),
                ..Default::default()
            },
            &[DrawRange {
                start: 0,
                count: idx.len() as u32,
            }],
        )
        .unwrap();
    }

    let flat = |s: &CaptureSink| -> Vec<Vec<f32>> { super::util::referenced_vertices(s) };
    assert_eq!(flat(&with_restart), flat(&separate));
}

#[test]
fn instanced_draw_replays_per_instance() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    let verts = [[0.5, 0.5, 0.0, 1.0]; 3];
    let buf = pos_buffer(&verts);
    let bufs_inner = [&buf[..]];
    let buffers = VertexBuffers {
        buffers: &bufs_inner,
    };
    let mut sink = CaptureSink::new();
    ctx.draw(
        &mut sink,
        &buffers,
        &Constants::default(),
        &DrawInfo {
            topology: PrimitiveTopology::TriangleList,
            instance_count: 3,
            ..Default::default()
        },
        &[DrawRange { start: 0, count: 3 }],
    )
    .unwrap();
    assert_eq!(sink.draws.len(), 3);
    assert_eq!(ctx.stats().prims_in, 3);
}

/// GS that re-emits its input triangle, then a second one shifted in X.
struct DoublingGs(ShaderInfo);

impl GeometryShader for DoublingGs {
    fn info(&self) -> &ShaderInfo {
        &self.0
    }
    fn input_topology(&self) -> GsInputPrim {
        GsInputPrim::Triangles
    }
    fn output_topology(&self) -> GsOutputPrim {
        GsOutputPrim::TriangleStrip
    }
    fn max_output_vertices(&self) -> usize {
        8
    }
    fn run(
        &self,
        input: &[&[[f32; 4]]],
        _primitive_id: u32,
        _invocation: u32,
        _constants: &Constants<'_>,
        out: &mut dyn GsEmit,
    ) {
        for v in input {
            out.emit_vertex(0, v);
        }
        out.end_primitive(0);
        for v in input {
            let mut shifted = v[0];
            shifted[0] += 0.25;
            out.emit_vertex(0, &[shifted]);
        }
        out.end_primitive(0);
    }
}

#[test]
fn geometry_shader_amplifies_primitives() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    ctx.bind_geometry_shader(Some(Box::new(DoublingGs(ShaderInfo::simple(1)))))
        .unwrap();
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::TriangleList,
        &[
            [0.0, 0.0, 0.0, 1.0],
            [0.5, 0.0, 0.0, 1.0],
            [0.0, 0.5, 0.0, 1.0],
        ],
    )
    .unwrap();
    let stats = ctx.stats();
    assert_eq!(stats.gs_invocations, 1);
    assert_eq!(stats.prims_out, 2);
    assert_eq!(sink.total_vertices_referenced(), 6);
}

struct UnitTes(ShaderInfo);

impl TessEvalShader for UnitTes {
    fn info(&self) -> &ShaderInfo {
        &self.0
    }
    fn domain(&self) -> TessDomain {
        TessDomain::Triangles
    }
    fn run(
        &self,
        patch: &[&[[f32; 4]]],
        coord: [f32; 2],
        _constants: &Constants<'_>,
        out: &mut [[f32; 4]],
    ) {
        // Barycentric blend of the patch corners.
        let w = 1.0 - coord[0] - coord[1];
        let mut p = [0.0; 4];
        for c in 0..4 {
            p[c] = w * patch[0][0][c] + coord[0] * patch[1][0][c] + coord[1] * patch[2][0][c];
        }
        out[0] = p;
    }
}

#[test]
fn patch_draw_runs_the_tessellator() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    ctx.bind_tess_shaders(None, Some(Box::new(UnitTes(ShaderInfo::simple(1)))))
        .unwrap();
    ctx.set_patch_state(3, [1.0; 4], [1.0; 2]);
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::Patches,
        &[
            [0.0, 0.0, 0.0, 1.0],
            [0.5, 0.0, 0.0, 1.0],
            [0.0, 0.5, 0.0, 1.0],
        ],
    )
    .unwrap();
    assert_eq!(ctx.stats().prims_out, 1);
    assert_eq!(sink.draws.len(), 1);
    assert_eq!(sink.draws[0].topology, PrimitiveTopology::TriangleList);
}

#[test]
fn patch_draw_without_tes_is_an_error() {
    let mut ctx = basic_context();
    let mut sink = CaptureSink::new();
    let err = draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::Patches,
        &[[0.0; 4]; 3],
    )
    .unwrap_err();
    assert_eq!(err, DrawError::PatchesWithoutTessellation);
}

#[test]
fn stream_output_captures_preclip_outputs() {
    let mut ctx = basic_context();
    ctx.set_clip_policy(no_clip());
    ctx.set_stream_output(
        SoLayout {
            decls: vec![SoDeclaration {
                stream: 0,
                register: 0,
                start_component: 0,
                num_components: 4,
                target: 0,
                dst_offset: 0,
            }],
            strides: [4, 0, 0, 0],
        },
        vec![SoTarget::with_capacity(64)],
    );
    let mut sink = CaptureSink::new();
    let verts = [
        [3.0, 0.0, 0.0, 1.0],
        [4.0, 0.0, 0.0, 2.0],
        [5.0, 1.0, 0.0, 1.0],
    ];
    draw_verts(&mut ctx, &mut sink, PrimitiveTopology::TriangleList, &verts).unwrap();

    let targets = ctx.take_stream_targets();
    assert_eq!(targets[0].offset, 12);
    // Shader outputs, before divide and viewport.
    assert_eq!(&targets[0].data[0..4], &verts[0]);
    assert_eq!(&targets[0].data[4..8], &verts[1]);
    assert_eq!(ctx.stats().so_vertices_written, 3);
}

struct TriMesh(ShaderInfo);

impl MeshShader for TriMesh {
    fn info(&self) -> &ShaderInfo {
        &self.0
    }
    fn run(&self, _constants: &Constants<'_>) -> MeshOutput {
        let mut vertices = VertexBlock::new(1);
        vertices.push(&[[0.0, 0.0, 0.0, 1.0]]);
        vertices.push(&[[0.5, 0.0, 0.0, 1.0]]);
        vertices.push(&[[0.0, 0.5, 0.0, 1.0]]);
        MeshOutput {
            topology: PrimitiveTopology::TriangleList,
            vertices,
            indices: vec![0, 1, 2],
        }
    }
}

#[test]
fn mesh_draw_bypasses_fetch_and_vs() {
    let mut ctx = DrawContext::new();
    ctx.bind_mesh_shader(Some(Box::new(TriMesh(ShaderInfo::simple(1)))))
        .unwrap();
    let mut sink = CaptureSink::new();
    ctx.draw_mesh(&mut sink, &Constants::default()).unwrap();
    assert_eq!(ctx.stats().prims_out, 1);
    assert_eq!(sink.total_vertices_referenced(), 3);
}

#[test]
fn viewport_maps_ndc_to_window() {
    let mut ctx = basic_context();
    ctx.set_viewports(&[crate::state::Viewport {
        scale: [320.0, -240.0, 0.5],
        translate: [320.0, 240.0, 0.5],
    }])
    .unwrap();
    ctx.set_clip_policy(ClipPolicy {
        clip_xy: false,
        clip_z: false,
        clip_user: false,
        ..ClipPolicy::default()
    });
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::PointList,
        &[[1.0, 1.0, 1.0, 1.0]],
    )
    .unwrap();
    assert_eq!(sink.draws[0].vertex(0), &[640.0, 0.0, 1.0, 1.0]);
}

#[test]
fn unsupported_format_zero_fills_but_draws() {
    let mut ctx = DrawContext::new();
    ctx.bind_vertex_shader(Box::new(SlotVs(ShaderInfo::simple(1))))
        .unwrap();
    ctx.set_vertex_elements(
        &[VertexElement {
            src_buffer: 0,
            src_offset: 0,
            src_stride: 16,
            instance_divisor: 0,
            format: VertexFormat::Unknown,
        }],
        1,
    )
    .unwrap();
    ctx.set_clip_policy(no_clip());
    let mut sink = CaptureSink::new();
    draw_verts(
        &mut ctx,
        &mut sink,
        PrimitiveTopology::PointList,
        &[[9.0, 9.0, 9.0, 9.0]],
    )
    .unwrap();
    assert_eq!(sink.draws[0].vertex(0), &[0.0, 0.0, 0.0, 1.0]);
}
