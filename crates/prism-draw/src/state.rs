//! State snapshots consumed by the pipeline.
//!
//! These mirror the driver-visible state objects: a rasterizer snapshot, the
//! viewport array, clip policy + user planes, and vertex buffer/element
//! bindings. All of them are plain data; setters on
//! [`DrawContext`](crate::DrawContext) copy them in and invalidate the
//! stage chain.

use crate::vertex::VertexFormat;

/// Upper bound on user-defined clip planes (outcode bits beyond the six
/// frustum planes).
pub const MAX_USER_CLIP_PLANES: usize = 8;

/// Upper bound on simultaneously bound viewports.
pub const MAX_VIEWPORTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

/// Read-only rasterizer state snapshot, in the shape the fixed-function
/// stages want to consult it.
#[derive(Clone, Debug, PartialEq)]
pub struct Rasterizer {
    pub fill_front: FillMode,
    pub fill_back: FillMode,
    pub cull: CullMode,
    /// Counter-clockwise winding is front-facing.
    pub front_ccw: bool,

    pub flatshade: bool,
    /// Provoking vertex is the first of the primitive (otherwise the last).
    pub flatshade_first: bool,
    pub light_twoside: bool,

    pub line_width: f32,
    pub line_smooth: bool,
    pub line_stipple_enable: bool,
    pub line_stipple_pattern: u16,
    pub line_stipple_factor: u16,

    pub point_size: f32,
    pub point_smooth: bool,
    /// Expand points into screen-aligned quads carrying sprite texcoords.
    pub point_quad_rasterization: bool,
    pub sprite_coord_origin_upper_left: bool,

    pub poly_stipple_enable: bool,

    pub offset_tri: bool,
    pub offset_line: bool,
    pub offset_point: bool,
    pub offset_units: f32,
    pub offset_scale: f32,
    pub offset_clamp: f32,

    /// Restrict Z clipping to the near plane only.
    pub depth_clip_near: bool,
    /// Disable Z clipping entirely (depth clamp done downstream).
    pub depth_clip_far_disabled: bool,
    /// Near plane at z = 0 (D3D convention) instead of z = -w.
    pub clip_halfz: bool,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self {
            fill_front: FillMode::Fill,
            fill_back: FillMode::Fill,
            cull: CullMode::None,
            front_ccw: true,
            flatshade: false,
            flatshade_first: false,
            light_twoside: false,
            line_width: 1.0,
            line_smooth: false,
            line_stipple_enable: false,
            line_stipple_pattern: 0xFFFF,
            line_stipple_factor: 0,
            point_size: 1.0,
            point_smooth: false,
            point_quad_rasterization: false,
            sprite_coord_origin_upper_left: true,
            poly_stipple_enable: false,
            offset_tri: false,
            offset_line: false,
            offset_point: false,
            offset_units: 0.0,
            offset_scale: 0.0,
            offset_clamp: 0.0,
            depth_clip_near: false,
            depth_clip_far_disabled: false,
            clip_halfz: false,
        }
    }
}

/// Viewport transform: `window = ndc * scale + translate` per axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub scale: [f32; 3],
    pub translate: [f32; 3],
}

impl Default for Viewport {
    fn default() -> Self {
        // Identity NDC passthrough until the driver sets a real viewport.
        Self {
            scale: [1.0, 1.0, 1.0],
            translate: [0.0, 0.0, 0.0],
        }
    }
}

/// Which clip tests run and how wide the accept region is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPolicy {
    /// Clip against the +-X/+-Y frustum planes. Off when the backend does
    /// its own XY clipping.
    pub clip_xy: bool,
    /// Clip against the +-Z planes (subject to the rasterizer's
    /// `depth_clip_near` / far-disable restrictions).
    pub clip_z: bool,
    /// Evaluate user clip planes.
    pub clip_user: bool,
    /// Guard-band multiplier (> 1.0) widening the XY outcode test for
    /// triangles; `None` disables the guard band.
    pub guard_band: Option<f32>,
    /// Independent, usually looser, guard band for points and lines.
    pub guard_band_points_lines: Option<f32>,
    /// The shader already produced window-space positions; skip the
    /// perspective divide and viewport transform.
    pub bypass_viewport: bool,
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self {
            clip_xy: true,
            clip_z: true,
            clip_user: true,
            guard_band: None,
            guard_band_points_lines: None,
            bypass_viewport: false,
        }
    }
}

/// User clip-plane array; planes are half-space coefficients `(a, b, c, d)`
/// tested as `dot(plane, clip_vertex) >= 0`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserClipPlanes {
    pub planes: Vec<[f32; 4]>,
}

/// How the bound depth buffer stores Z, for polygon-offset's
/// minimum-resolvable-depth computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthFormat {
    /// Floating-point depth: MRD depends on the magnitude of Z itself.
    Float,
    /// Fixed-point depth with the given bit count.
    Unorm { bits: u32 },
}

impl Default for DepthFormat {
    fn default() -> Self {
        Self::Unorm { bits: 24 }
    }
}

/// Per-context pipeline capability knobs, supplied by the driver once at
/// setup (thresholds compared with `>`; 0 means "always convert").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineCaps {
    pub wide_line_threshold: f32,
    pub wide_point_threshold: f32,
    /// Expand wide points even when only sprite coords (not size) demand it.
    pub wide_point_sprites: bool,
    /// The driver wants line stipple done here rather than in its rasterizer.
    pub line_stipple: bool,
    pub depth_format: DepthFormat,
}

impl Default for PipelineCaps {
    fn default() -> Self {
        Self {
            wide_line_threshold: 1.0,
            wide_point_threshold: 1.0,
            wide_point_sprites: false,
            line_stipple: true,
            depth_format: DepthFormat::default(),
        }
    }
}

/// One vertex-element descriptor: where and how to fetch one attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexElement {
    pub src_buffer: usize,
    pub src_offset: usize,
    /// Byte stride between consecutive records; 0 replicates the record.
    pub src_stride: usize,
    /// 0 = per-vertex; > 0 = advance once per `divisor` instances.
    pub instance_divisor: u32,
    pub format: VertexFormat,
}
