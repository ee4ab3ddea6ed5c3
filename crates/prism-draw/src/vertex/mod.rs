//! Vertex fetch: raw buffer memory → canonical float4 attribute records.

mod fetch;
mod format;

pub use fetch::{FetchMachine, VertexBuffers};
pub use format::{decode, VertexFormat};
