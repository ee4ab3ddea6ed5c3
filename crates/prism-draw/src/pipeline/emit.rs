use tracing::warn;

use crate::backend::RenderSink;
use crate::prim::PipeVertex;
use crate::shader::VertexBlock;
use crate::topology::PrimitiveTopology;

/// Terminal emission buffer behind the rasterize stage.
///
/// Collects pipeline vertices into a flat float buffer plus a u16 element
/// list, flushing to the sink when the primitive class changes or the u16
/// index space would overflow.
pub struct PipeEmitter<'a> {
    sink: &'a mut dyn RenderSink,
    stride_floats: usize,
    topology: Option<PrimitiveTopology>,
    verts: Vec<f32>,
    num_verts: usize,
    indices: Vec<u16>,
    warned_alloc: bool,
}

/// Leave headroom under the u16 index limit so a whole triangle always fits.
const FLUSH_VERTEX_LIMIT: usize = u16::MAX as usize - 4;

impl<'a> PipeEmitter<'a> {
    pub fn new(sink: &'a mut dyn RenderSink, slots: usize) -> Self {
        Self {
            sink,
            stride_floats: slots * 4,
            topology: None,
            verts: Vec::new(),
            num_verts: 0,
            indices: Vec::new(),
            warned_alloc: false,
        }
    }

    fn set_topology(&mut self, topology: PrimitiveTopology) {
        if self.topology != Some(topology) {
            self.flush();
            self.topology = Some(topology);
        }
    }

    fn push_vertex(&mut self, v: &PipeVertex) -> u16 {
        let id = self.num_verts as u16;
        self.num_verts += 1;
        for slot in &v.data {
            self.verts.extend_from_slice(slot);
        }
        id
    }

    fn maybe_flush(&mut self) {
        if self.num_verts >= FLUSH_VERTEX_LIMIT {
            self.flush();
        }
    }

    pub fn point(&mut self, v: &PipeVertex) {
        self.set_topology(PrimitiveTopology::PointList);
        let i = self.push_vertex(v);
        self.indices.push(i);
        self.maybe_flush();
    }

    pub fn line(&mut self, a: &PipeVertex, b: &PipeVertex) {
        self.set_topology(PrimitiveTopology::LineList);
        let ia = self.push_vertex(a);
        let ib = self.push_vertex(b);
        self.indices.extend_from_slice(&[ia, ib]);
        self.maybe_flush();
    }

    pub fn tri(&mut self, a: &PipeVertex, b: &PipeVertex, c: &PipeVertex) {
        self.set_topology(PrimitiveTopology::TriangleList);
        let ia = self.push_vertex(a);
        let ib = self.push_vertex(b);
        let ic = self.push_vertex(c);
        self.indices.extend_from_slice(&[ia, ib, ic]);
        self.maybe_flush();
    }

    /// Emit an already-transformed block wholesale, element list and
    /// topology intact, bypassing per-primitive collection. The caller
    /// guarantees the block fits u16 addressing.
    pub fn block(&mut self, block: &VertexBlock, elements: &[u32], topology: PrimitiveTopology) {
        self.flush();
        // The sink's current primitive no longer matches the open batch.
        self.topology = None;
        let count = block.count();
        if count == 0 || elements.is_empty() {
            return;
        }
        self.sink.set_primitive(topology);
        if !self.sink.allocate_vertices(self.stride_floats, count) {
            if !self.warned_alloc {
                warn!(
                    vertices = count,
                    "backend refused vertex allocation; dropping batch"
                );
                self.warned_alloc = true;
            }
            return;
        }
        let mapped = self.sink.vertices_mut();
        for i in 0..count {
            let dst = &mut mapped[i * self.stride_floats..];
            for (s, slot) in block.vertex(i).iter().enumerate() {
                dst[s * 4..s * 4 + 4].copy_from_slice(slot);
            }
        }
        let indices: Vec<u16> = elements.iter().map(|&e| e as u16).collect();
        self.sink.draw_elements(&indices);
        self.sink.release_vertices();
    }

    /// Primitives emitted so far in the open batch plus flushed batches.
    pub fn flush(&mut self) {
        if self.num_verts == 0 {
            return;
        }
        let topology = self.topology.expect("vertices without a topology");
        self.sink.set_primitive(topology);
        if self.sink.allocate_vertices(self.stride_floats, self.num_verts) {
            let mapped = self.sink.vertices_mut();
            mapped[..self.verts.len()].copy_from_slice(&self.verts);
            self.sink.draw_elements(&self.indices);
            self.sink.release_vertices();
        } else if !self.warned_alloc {
            // Resource exhaustion: drop the batch, keep the frame valid.
            warn!(
                vertices = self.num_verts,
                "backend refused vertex allocation; dropping batch"
            );
            self.warned_alloc = true;
        }
        self.verts.clear();
        self.indices.clear();
        self.num_verts = 0;
    }
}
