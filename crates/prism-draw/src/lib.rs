//! Software geometry pipeline: vertex fetch, shader-executor adapters,
//! clipping and viewport transform, fixed-function primitive stages, and
//! stream output, in front of an opaque rasterizer backend.
//!
//! The flow per draw call:
//!
//! 1. The frontend ([`frontend`]) classifies the draw, resolves the index
//!    buffer (primitive restart, index bias) and splits long runs into
//!    bounded chunks with carry-vertex replay.
//! 2. A middle-end fetches and shades each chunk. Plain vertex-shader
//!    draws needing neither clip test nor fixed-function stages take the
//!    fast path straight to the sink; everything else runs tessellation,
//!    geometry shading and stream output, then feeds the stage chain.
//! 3. The stage chain ([`pipeline`]) — clip, cull, two-sided lighting,
//!    polygon offset, unfilled polygons, stipple, wide/AA points and
//!    lines — transforms primitives one at a time and emits batched
//!    vertex buffers plus `u16` element lists to the [`RenderSink`].
//!
//! Shaders are opaque executors behind the traits in [`shader`]; this
//! crate never interprets shader programs, only their declared output
//! layouts.

pub mod backend;
pub mod context;
pub mod error;
pub mod extra;
pub mod frontend;
pub mod geometry;
mod middle;
pub mod pipeline;
pub mod postshade;
pub mod prim;
pub mod shader;
pub mod state;
pub mod stats;
pub mod stream_output;
pub mod tess;
pub mod topology;
pub mod vertex;

pub use backend::{CaptureSink, CapturedDraw, CapturedDrawKind, RenderSink};
pub use context::{DrawContext, FlushReason};
pub use error::DrawError;
pub use frontend::{DrawInfo, DrawRange, IndexSlice, OpsMask};
pub use pipeline::{DriverHooks, NullHooks, StageInstalls};
pub use shader::{
    Constants, FragmentInfo, GeometryShader, MeshShader, ShaderInfo, TessCtrlShader,
    TessEvalShader, VertexBlock, VertexShader,
};
pub use state::{
    ClipPolicy, CullMode, DepthFormat, FillMode, PipelineCaps, Rasterizer, UserClipPlanes,
    VertexElement, Viewport,
};
pub use stats::DrawStats;
pub use stream_output::{SoDeclaration, SoLayout, SoTarget};
pub use topology::PrimitiveTopology;
pub use vertex::{VertexBuffers, VertexFormat};

#[cfg(test)]
mod tests;
