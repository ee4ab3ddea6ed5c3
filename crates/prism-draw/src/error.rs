use crate::topology::PrimitiveTopology;
use thiserror::Error;

/// Configuration errors surfaced from bind/install calls.
///
/// Everything else in the pipeline degrades (clamps, drops, falls back)
/// rather than erroring; see the module docs on `context`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("shader declares {declared} output slots but slot {slot} is referenced as {role}")]
    OutputSlotOutOfRange {
        declared: usize,
        slot: usize,
        role: &'static str,
    },
    #[error("shader declares {0} output slots (limit {1})")]
    TooManyOutputs(usize, usize),
    #[error("geometry shader declares {0} vertex streams (limit {1})")]
    TooManyStreams(usize, usize),
    #[error("geometry shader declares zero max output vertices")]
    EmptyGeometryShader,
    #[error("tess control shader declares zero output patch vertices")]
    EmptyPatch,
    #[error("extra attribute slot table exhausted ({0} synthetic slots)")]
    ExtraSlotsExhausted(usize),
    #[error("stream-output declaration targets buffer {buffer} but only {bound} targets may be bound")]
    StreamOutputTargetOutOfRange { buffer: usize, bound: usize },
    #[error("stream-output declaration names stream {stream} (limit {limit})")]
    StreamOutputStreamOutOfRange { stream: usize, limit: usize },
    #[error("stream-output declaration reads {count} components from component {start} of a float4 slot")]
    StreamOutputComponentOutOfRange { start: usize, count: usize },
    #[error("stream-output declaration writes {needed} floats at offset {offset} of target {target} (stride {stride})")]
    StreamOutputStrideOverrun {
        target: usize,
        offset: usize,
        needed: usize,
        stride: usize,
    },
    #[error("adjacency topology {0} cannot be captured by stream output")]
    StreamOutputAdjacency(PrimitiveTopology),
    #[error("vertex element {element} references vertex buffer {buffer} but only {bound} are bound")]
    VertexBufferOutOfRange {
        element: usize,
        buffer: usize,
        bound: usize,
    },
    #[error("{0} user clip planes set (limit {1})")]
    TooManyClipPlanes(usize, usize),
    #[error("{0} viewports set (limit {1})")]
    TooManyViewports(usize, usize),
    #[error("draw requires a bound vertex shader")]
    MissingVertexShader,
    #[error("mesh draw requires a bound mesh shader")]
    MissingMeshShader,
    #[error("patch topology draw without tessellation shaders bound")]
    PatchesWithoutTessellation,
}
