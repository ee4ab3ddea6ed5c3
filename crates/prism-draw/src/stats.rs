/// Per-context pipeline counters.
///
/// Cheap plain counters (the context is single-threaded by contract);
/// snapshots go to the driver through
/// [`RenderSink::report_statistics`](crate::backend::RenderSink).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Draw calls that reached a middle-end.
    pub draws: u64,
    /// Primitives entering the pipeline or emit path.
    pub prims_in: u64,
    /// Primitives handed to the backend sink.
    pub prims_out: u64,
    /// Primitives entering the geometric clip stage.
    pub clipper_in: u64,
    /// Primitives surviving the geometric clip stage.
    pub clipper_out: u64,
    /// Primitives discarded by the cull stage.
    pub culled: u64,
    /// Geometry-shader invocations.
    pub gs_invocations: u64,
    /// Vertices written by stream output (across all streams).
    pub so_vertices_written: u64,
    /// Primitives skipped by stream output for lack of buffer space.
    pub so_overflows: u64,
    /// Stage-chain rebuilds triggered by state invalidation.
    pub chain_rebuilds: u64,
}

impl DrawStats {
    pub fn snapshot(&self) -> DrawStats {
        *self
    }
}
