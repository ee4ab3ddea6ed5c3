//! Shared scaffolding for the end-to-end tests: a slot-copying vertex
//! shader, position-buffer builders, and a sink wrapper that forces the
//! fixed-function pipeline on.

use crate::backend::{CaptureSink, RenderSink};
use crate::frontend::{DrawInfo, DrawRange};
use crate::shader::{Constants, ShaderInfo, VertexBlock, VertexShader};
use crate::state::{ClipPolicy, Rasterizer, VertexElement};
use crate::stats::DrawStats;
use crate::topology::PrimitiveTopology;
use crate::vertex::{VertexBuffers, VertexFormat};
use crate::{DrawContext, DrawError};

/// Copies every input slot to the corresponding output slot.
pub struct SlotVs(pub ShaderInfo);

impl VertexShader for SlotVs {
    fn info(&self) -> &ShaderInfo {
        &self.0
    }

    fn run(&self, inputs: &VertexBlock, _constants: &Constants<'_>, outputs: &mut VertexBlock) {
        for i in 0..inputs.count() {
            outputs.push(inputs.vertex(i));
        }
    }
}

pub fn pos_buffer(verts: &[[f32; 4]]) -> Vec<u8> {
    verts
        .iter()
        .flatten()
        .flat_map(|f| f.to_le_bytes())
        .collect()
}

/// Context with one float4 position attribute and a slot-copying VS.
pub fn basic_context() -> DrawContext {
    let mut ctx = DrawContext::new();
    ctx.bind_vertex_shader(Box::new(SlotVs(ShaderInfo::simple(1))))
        .unwrap();
    ctx.set_vertex_elements(
        &[VertexElement {
            src_buffer: 0,
            src_offset: 0,
            src_stride: 16,
            instance_divisor: 0,
            format: VertexFormat::Float32x4,
        }],
        1,
    )
    .unwrap();
    ctx
}

/// Clip policy with every test disabled, for draws whose geometry is
/// deliberately outside the unit cube.
pub fn no_clip() -> ClipPolicy {
    ClipPolicy {
        clip_xy: false,
        clip_z: false,
        clip_user: false,
        ..ClipPolicy::default()
    }
}

pub fn draw_verts(
    ctx: &mut DrawContext,
    sink: &mut dyn RenderSink,
    topology: PrimitiveTopology,
    verts: &[[f32; 4]],
) -> Result<(), DrawError> {
    let buf = pos_buffer(verts);
    let bufs_inner = [&buf[..]];
    let buffers = VertexBuffers {
        buffers: &bufs_inner,
    };
    let info = DrawInfo {
        topology,
        ..Default::default()
    };
    ctx.draw(
        sink,
        &buffers,
        &Constants::default(),
        &info,
        &[DrawRange {
            start: 0,
            count: verts.len() as u32,
        }],
    )
}

/// Delegating sink whose `need_pipeline` always answers yes, pushing every
/// draw through the stage chain.
#[derive(Debug, Default)]
pub struct ForcePipelineSink(pub CaptureSink);

impl RenderSink for ForcePipelineSink {
    fn set_primitive(&mut self, topology: PrimitiveTopology) {
        self.0.set_primitive(topology);
    }

    fn allocate_vertices(&mut self, stride_floats: usize, count: usize) -> bool {
        self.0.allocate_vertices(stride_floats, count)
    }

    fn vertices_mut(&mut self) -> &mut [f32] {
        self.0.vertices_mut()
    }

    fn draw_arrays(&mut self, start: u32, count: u32) {
        self.0.draw_arrays(start, count);
    }

    fn draw_elements(&mut self, indices: &[u16]) {
        self.0.draw_elements(indices);
    }

    fn release_vertices(&mut self) {
        self.0.release_vertices();
    }

    fn need_pipeline(&self, _rast: &Rasterizer, _topology: PrimitiveTopology) -> Option<bool> {
        Some(true)
    }

    fn report_statistics(&mut self, stats: &DrawStats) {
        self.0.report_statistics(stats);
    }
}

/// Flatten every captured draw into the referenced per-vertex records, in
/// submission order.
pub fn referenced_vertices(sink: &CaptureSink) -> Vec<Vec<f32>> {
    let mut out = Vec::new();
    for d in &sink.draws {
        for i in d.indices() {
            out.push(d.vertex(i as usize).to_vec());
        }
    }
    out
}
