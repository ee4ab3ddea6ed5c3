//! Opaque shader executor seams.
//!
//! The pipeline never interprets or compiles shaders; it invokes executors
//! through these traits and only cares about the declared output slot
//! layout. The layout of whichever stage runs last (VS, GS, TES or mesh) is
//! what every downstream consumer queries, via
//! [`DrawContext::current_shader_info`](crate::DrawContext).

use crate::error::DrawError;

/// Hard cap on float4 output slots per shader stage.
pub const MAX_SHADER_OUTPUTS: usize = 32;

/// Hard cap on geometry-shader vertex streams.
pub const MAX_VERTEX_STREAMS: usize = 4;

/// Declared output slot layout of a shader stage.
///
/// Slot indices refer to float4 records in the order the executor writes
/// them. `position_output` is mandatory; the rest are optional roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderInfo {
    pub num_outputs: usize,
    pub position_output: usize,
    /// Separate clip-space vertex used for user-plane evaluation, when the
    /// shader writes one distinct from `position_output`.
    pub clipvertex_output: Option<usize>,
    pub viewport_index_output: Option<usize>,
    /// Edge-flag output (x component, nonzero = edge present).
    pub edgeflag_output: Option<usize>,
    /// Up to two float4 slots of written clip distances, packed x,y,z,w.
    pub clipdist_outputs: [Option<usize>; 2],
    pub num_written_clipdistance: usize,
    /// Up to two float4 slots of written cull distances.
    pub culldist_outputs: [Option<usize>; 2],
    pub num_written_culldistance: usize,
    /// Per-vertex point size (x component).
    pub point_size_output: Option<usize>,
    /// Front color slots (two-sided lighting source).
    pub color_outputs: [Option<usize>; 2],
    /// Back color slots swapped in for back-facing triangles.
    pub back_color_outputs: [Option<usize>; 2],
}

impl ShaderInfo {
    /// Minimal layout: `num_outputs` slots with position in slot 0.
    pub fn simple(num_outputs: usize) -> Self {
        Self {
            num_outputs,
            position_output: 0,
            clipvertex_output: None,
            viewport_index_output: None,
            edgeflag_output: None,
            clipdist_outputs: [None; 2],
            num_written_clipdistance: 0,
            culldist_outputs: [None; 2],
            num_written_culldistance: 0,
            point_size_output: None,
            color_outputs: [None; 2],
            back_color_outputs: [None; 2],
        }
    }

    pub fn validate(&self) -> Result<(), DrawError> {
        if self.num_outputs == 0 || self.num_outputs > MAX_SHADER_OUTPUTS {
            return Err(DrawError::TooManyOutputs(self.num_outputs, MAX_SHADER_OUTPUTS));
        }
        let check = |slot: Option<usize>, role: &'static str| -> Result<(), DrawError> {
            match slot {
                Some(s) if s >= self.num_outputs => Err(DrawError::OutputSlotOutOfRange {
                    declared: self.num_outputs,
                    slot: s,
                    role,
                }),
                _ => Ok(()),
            }
        };
        check(Some(self.position_output), "position")?;
        check(self.clipvertex_output, "clip vertex")?;
        check(self.viewport_index_output, "viewport index")?;
        check(self.edgeflag_output, "edge flag")?;
        for s in self.clipdist_outputs {
            check(s, "clip distance")?;
        }
        for s in self.culldist_outputs {
            check(s, "cull distance")?;
        }
        check(self.point_size_output, "point size")?;
        for s in self.color_outputs {
            check(s, "color")?;
        }
        for s in self.back_color_outputs {
            check(s, "back color")?;
        }
        Ok(())
    }
}

/// A batch of vertex records: `count` vertices of `num_slots` float4 slots
/// each, stored contiguously. The slot count is fixed for the lifetime of
/// one batch and must match across every stage consuming it.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexBlock {
    num_slots: usize,
    data: Vec<[f32; 4]>,
}

impl VertexBlock {
    pub fn new(num_slots: usize) -> Self {
        Self {
            num_slots,
            data: Vec::new(),
        }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn count(&self) -> usize {
        if self.num_slots == 0 {
            0
        } else {
            self.data.len() / self.num_slots
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, slots: &[[f32; 4]]) {
        assert_eq!(slots.len(), self.num_slots, "vertex slot count mismatch");
        self.data.extend_from_slice(slots);
    }

    /// Append a zero-filled vertex and return its slots for writing.
    pub fn push_uninit(&mut self) -> &mut [[f32; 4]] {
        let start = self.data.len();
        self.data.resize(start + self.num_slots, [0.0; 4]);
        &mut self.data[start..]
    }

    pub fn vertex(&self, i: usize) -> &[[f32; 4]] {
        &self.data[i * self.num_slots..(i + 1) * self.num_slots]
    }

    pub fn vertex_mut(&mut self, i: usize) -> &mut [[f32; 4]] {
        &mut self.data[i * self.num_slots..(i + 1) * self.num_slots]
    }

    /// Drop vertices past `count`.
    pub fn truncate(&mut self, count: usize) {
        self.data.truncate(count * self.num_slots);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Constant/uniform bindings, borrowed for the duration of one draw call.
#[derive(Clone, Copy, Debug, Default)]
pub struct Constants<'a> {
    pub buffers: &'a [&'a [f32]],
}

/// Vertex shader executor: one output record per input record, in order.
pub trait VertexShader {
    fn info(&self) -> &ShaderInfo;

    /// Run over the whole fetched batch. `outputs` arrives empty with the
    /// slot count from [`ShaderInfo::num_outputs`]; the executor must push
    /// exactly `inputs.count()` vertices.
    fn run(&self, inputs: &VertexBlock, constants: &Constants<'_>, outputs: &mut VertexBlock);
}

/// Geometry-shader input groupings (after adjacency decomposition the
/// executor still sees the adjacency vertices when it asked for them).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GsInputPrim {
    Points,
    Lines,
    LinesAdjacency,
    Triangles,
    TrianglesAdjacency,
}

impl GsInputPrim {
    pub fn vertex_count(self) -> usize {
        match self {
            Self::Points => 1,
            Self::Lines => 2,
            Self::LinesAdjacency => 4,
            Self::Triangles => 3,
            Self::TrianglesAdjacency => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GsOutputPrim {
    Points,
    LineStrip,
    TriangleStrip,
}

/// Sink the geometry-shader executor writes through: vertices are appended
/// to the named stream, `end_primitive` closes the current strip/run.
pub trait GsEmit {
    fn emit_vertex(&mut self, stream: usize, slots: &[[f32; 4]]);
    fn end_primitive(&mut self, stream: usize);
}

/// Geometry shader executor, invoked once per input primitive per
/// invocation index.
pub trait GeometryShader {
    fn info(&self) -> &ShaderInfo;
    fn input_topology(&self) -> GsInputPrim;
    fn output_topology(&self) -> GsOutputPrim;
    fn max_output_vertices(&self) -> usize;
    fn invocations(&self) -> u32 {
        1
    }
    fn num_streams(&self) -> usize {
        1
    }

    fn run(
        &self,
        input: &[&[[f32; 4]]],
        primitive_id: u32,
        invocation: u32,
        constants: &Constants<'_>,
        out: &mut dyn GsEmit,
    );
}

/// Tessellation levels a TCS may write; `None` components fall back to the
/// context's default levels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TessLevels {
    pub outer: [Option<f32>; 4],
    pub inner: [Option<f32>; 2],
}

/// Tess-control executor: runs once per *output* patch vertex.
pub trait TessCtrlShader {
    fn info(&self) -> &ShaderInfo;
    fn output_patch_vertices(&self) -> u32;

    /// Produce output vertex `out_vertex` of the patch into `out`, and
    /// optionally write tess levels (any invocation may; last write wins).
    fn run(
        &self,
        patch: &[&[[f32; 4]]],
        out_vertex: u32,
        constants: &Constants<'_>,
        out: &mut [[f32; 4]],
        levels: &mut TessLevels,
    );
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TessDomain {
    Triangles,
    /// Quads are emitted as triangles.
    Quads,
    Isolines,
}

/// Tess-eval executor: runs once per generated domain point.
pub trait TessEvalShader {
    fn info(&self) -> &ShaderInfo;
    fn domain(&self) -> TessDomain;
    /// Emit points instead of the domain's connected topology.
    fn point_mode(&self) -> bool {
        false
    }

    /// `coord` is the domain coordinate: (u, v) for quads, barycentric
    /// (u, v) with w = 1-u-v for triangles, (line, t) for isolines.
    fn run(
        &self,
        patch: &[&[[f32; 4]]],
        coord: [f32; 2],
        constants: &Constants<'_>,
        out: &mut [[f32; 4]],
    );
}

/// Mesh shader executor: produces vertices and connectivity wholesale,
/// bypassing fetch/VS/GS.
pub trait MeshShader {
    fn info(&self) -> &ShaderInfo;
    fn run(&self, constants: &Constants<'_>) -> MeshOutput;
}

/// Mesh executor output, injected directly into post-shade processing.
#[derive(Clone, Debug)]
pub struct MeshOutput {
    pub topology: crate::topology::PrimitiveTopology,
    pub vertices: VertexBlock,
    pub indices: Vec<u16>,
}

/// Fragment-shader *metadata* only — execution is out of scope, but the
/// pipeline needs to know which inputs are flat-shaded and whether a
/// front-face input must be synthesized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FragmentInfo {
    /// Vertex output slots consumed with flat interpolation.
    pub flat_slots: Vec<usize>,
    pub needs_front_face: bool,
}
