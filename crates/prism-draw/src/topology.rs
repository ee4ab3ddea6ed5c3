use std::fmt;

/// Primitive topologies accepted at the draw entry point.
///
/// This is a "semantic" enum (not raw API constants) so the rest of the
/// pipeline can stay API-independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    /// Closed line strip; the frontend appends the closing segment (or marks
    /// the run `LINELOOP_AS_STRIP` when it had to split the loop).
    LineLoop,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListAdjacency,
    LineStripAdjacency,
    TriangleListAdjacency,
    TriangleStripAdjacency,
    /// Tessellation patches; the group size comes from `patch_vertices`.
    Patches,
}

impl fmt::Display for PrimitiveTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PointList => "point_list",
            Self::LineList => "line_list",
            Self::LineStrip => "line_strip",
            Self::LineLoop => "line_loop",
            Self::TriangleList => "triangle_list",
            Self::TriangleStrip => "triangle_strip",
            Self::TriangleFan => "triangle_fan",
            Self::LineListAdjacency => "line_list_adjacency",
            Self::LineStripAdjacency => "line_strip_adjacency",
            Self::TriangleListAdjacency => "triangle_list_adjacency",
            Self::TriangleStripAdjacency => "triangle_strip_adjacency",
            Self::Patches => "patches",
        };
        f.write_str(s)
    }
}

/// The consumer-visible element class a topology reduces to once adjacency
/// vertices are stripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReducedPrim {
    Points,
    Lines,
    Triangles,
}

impl PrimitiveTopology {
    pub fn is_adjacency(self) -> bool {
        matches!(
            self,
            Self::LineListAdjacency
                | Self::LineStripAdjacency
                | Self::TriangleListAdjacency
                | Self::TriangleStripAdjacency
        )
    }

    pub fn reduced(self, patch_vertices: u32) -> ReducedPrim {
        match self {
            Self::PointList => ReducedPrim::Points,
            Self::LineList
            | Self::LineStrip
            | Self::LineLoop
            | Self::LineListAdjacency
            | Self::LineStripAdjacency => ReducedPrim::Lines,
            Self::TriangleList
            | Self::TriangleStrip
            | Self::TriangleFan
            | Self::TriangleListAdjacency
            | Self::TriangleStripAdjacency => ReducedPrim::Triangles,
            // Patches only reach the rasterizer through the tessellator,
            // which re-tags the stream; classify by group size for the
            // degenerate passthrough case.
            Self::Patches => match patch_vertices {
                0 | 1 => ReducedPrim::Points,
                2 => ReducedPrim::Lines,
                _ => ReducedPrim::Triangles,
            },
        }
    }

    /// Trim `count` down to the largest prefix that decomposes into whole
    /// primitives. Returns 0 when `count` cannot form even one.
    pub fn trim(self, count: u32, patch_vertices: u32) -> u32 {
        match self {
            Self::PointList => count,
            Self::LineList => count - count % 2,
            Self::LineStrip | Self::LineLoop => {
                if count < 2 {
                    0
                } else {
                    count
                }
            }
            Self::TriangleList => count - count % 3,
            Self::TriangleStrip | Self::TriangleFan => {
                if count < 3 {
                    0
                } else {
                    count
                }
            }
            Self::LineListAdjacency => count - count % 4,
            Self::LineStripAdjacency => {
                if count < 4 {
                    0
                } else {
                    count
                }
            }
            Self::TriangleListAdjacency => count - count % 6,
            Self::TriangleStripAdjacency => {
                if count < 6 {
                    0
                } else {
                    count - count % 2
                }
            }
            Self::Patches => {
                let n = patch_vertices.max(1);
                count - count % n
            }
        }
    }

    /// Number of whole primitives `count` vertices decompose into.
    pub fn prim_count(self, count: u32, patch_vertices: u32) -> u32 {
        let count = self.trim(count, patch_vertices);
        match self {
            Self::PointList => count,
            Self::LineList => count / 2,
            Self::LineStrip => count.saturating_sub(1),
            Self::LineLoop => {
                if count < 2 {
                    0
                } else if count == 2 {
                    1
                } else {
                    count
                }
            }
            Self::TriangleList => count / 3,
            Self::TriangleStrip | Self::TriangleFan => count.saturating_sub(2),
            Self::LineListAdjacency => count / 4,
            Self::LineStripAdjacency => count.saturating_sub(3),
            Self::TriangleListAdjacency => count / 6,
            Self::TriangleStripAdjacency => count.saturating_sub(4) / 2,
            Self::Patches => count / patch_vertices.max(1),
        }
    }

    /// When a run is split mid-stream, how many trailing vertices of the
    /// previous chunk must be replayed at the head of the next chunk so no
    /// primitive is lost across the boundary.
    pub fn carry_count(self, patch_vertices: u32) -> u32 {
        match self {
            Self::PointList | Self::LineList | Self::TriangleList => 0,
            Self::LineStrip | Self::LineLoop => 1,
            Self::TriangleStrip => 2,
            // The fan pivot (vertex 0) is re-sent separately; one ordinary
            // carry vertex besides it.
            Self::TriangleFan => 1,
            Self::LineListAdjacency => 0,
            Self::LineStripAdjacency => 3,
            Self::TriangleListAdjacency => 0,
            Self::TriangleStripAdjacency => 4,
            Self::Patches => {
                let _ = patch_vertices;
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_drops_partial_primitives() {
        assert_eq!(PrimitiveTopology::TriangleList.trim(8, 0), 6);
        assert_eq!(PrimitiveTopology::LineList.trim(7, 0), 6);
        assert_eq!(PrimitiveTopology::TriangleStrip.trim(2, 0), 0);
        assert_eq!(PrimitiveTopology::TriangleStrip.trim(5, 0), 5);
        assert_eq!(PrimitiveTopology::LineListAdjacency.trim(11, 0), 8);
        assert_eq!(PrimitiveTopology::TriangleStripAdjacency.trim(9, 0), 8);
        assert_eq!(PrimitiveTopology::Patches.trim(10, 3), 9);
    }

    #[test]
    fn prim_counts() {
        assert_eq!(PrimitiveTopology::TriangleStrip.prim_count(6, 0), 4);
        assert_eq!(PrimitiveTopology::TriangleFan.prim_count(6, 0), 4);
        assert_eq!(PrimitiveTopology::LineLoop.prim_count(4, 0), 4);
        assert_eq!(PrimitiveTopology::LineLoop.prim_count(2, 0), 1);
        assert_eq!(PrimitiveTopology::TriangleListAdjacency.prim_count(12, 0), 2);
        assert_eq!(PrimitiveTopology::TriangleStripAdjacency.prim_count(8, 0), 2);
    }
}
