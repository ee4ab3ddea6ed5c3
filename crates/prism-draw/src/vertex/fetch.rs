use tracing::warn;

use crate::error::DrawError;
use crate::shader::VertexBlock;
use crate::state::VertexElement;
use crate::vertex::format;

/// Raw vertex-buffer bindings, borrowed for the duration of one draw call.
#[derive(Clone, Copy, Debug, Default)]
pub struct VertexBuffers<'a> {
    pub buffers: &'a [&'a [u8]],
}

/// Translates raw vertex-buffer memory into canonical float4 attribute
/// records per the bound vertex-element table.
///
/// Built once per element-table change; unsupported formats are diagnosed
/// here (once), never per vertex.
#[derive(Clone, Debug)]
pub struct FetchMachine {
    elements: Vec<VertexElement>,
}

impl FetchMachine {
    pub fn new(elements: &[VertexElement], num_buffers: usize) -> Result<Self, DrawError> {
        for (i, el) in elements.iter().enumerate() {
            if el.src_buffer >= num_buffers {
                return Err(DrawError::VertexBufferOutOfRange {
                    element: i,
                    buffer: el.src_buffer,
                    bound: num_buffers,
                });
            }
            if !el.format.is_supported() {
                // Configuration error: report once here, fetch zero-fills.
                warn!(element = i, "vertex element declares an unsupported format");
            }
        }
        Ok(Self {
            elements: elements.to_vec(),
        })
    }

    pub fn num_attrs(&self) -> usize {
        self.elements.len()
    }

    /// Highest vertex index addressable by every per-vertex element given
    /// the bound buffers. Indices at or beyond this resolve to 0.
    pub fn max_index(&self, bufs: &VertexBuffers<'_>) -> u32 {
        let mut max = u32::MAX;
        for el in &self.elements {
            if el.instance_divisor > 0 {
                continue;
            }
            let Some(buf) = bufs.buffers.get(el.src_buffer) else {
                return 0;
            };
            let avail = buf.len().saturating_sub(el.src_offset);
            let size = el.format.byte_size();
            let n = if el.src_stride == 0 {
                if avail >= size {
                    u32::MAX
                } else {
                    0
                }
            } else if avail < size {
                0
            } else {
                (1 + (avail - size) / el.src_stride).min(u32::MAX as usize) as u32
            };
            max = max.min(n);
        }
        max
    }

    fn fetch_one(
        &self,
        bufs: &VertexBuffers<'_>,
        vertex_index: u32,
        instance_id: u32,
        out: &mut [[f32; 4]],
    ) {
        for (slot, el) in self.elements.iter().enumerate() {
            let idx = if el.instance_divisor > 0 {
                instance_id / el.instance_divisor
            } else {
                vertex_index
            };
            let size = el.format.byte_size();
            let offset = el.src_offset + idx as usize * el.src_stride;
            let bytes = bufs
                .buffers
                .get(el.src_buffer)
                .and_then(|b| b.get(offset..offset + size));
            out[slot] = match bytes {
                Some(bytes) if el.format.is_supported() => format::decode(el.format, bytes),
                // Out-of-range or unsupported: zero-filled, never a fault.
                _ => [0.0, 0.0, 0.0, 1.0],
            };
        }
    }

    /// Fetch a contiguous range `[start, start + count)`.
    pub fn fetch_linear(
        &self,
        bufs: &VertexBuffers<'_>,
        start: u32,
        count: u32,
        instance_id: u32,
        out: &mut VertexBlock,
    ) {
        debug_assert_eq!(out.num_slots(), self.elements.len());
        for i in 0..count {
            let slots = out.push_uninit();
            // Linear ranges are not index-clamped; reads beyond buffer
            // capacity simply zero-fill in `fetch_one`.
            self.fetch_one(bufs, start + i, instance_id, slots);
        }
    }

    /// Fetch by explicit element list. Indices at or beyond `max_index`
    /// resolve to vertex 0 (never an out-of-bounds read).
    pub fn fetch_indexed(
        &self,
        bufs: &VertexBuffers<'_>,
        indices: &[u32],
        max_index: u32,
        instance_id: u32,
        out: &mut VertexBlock,
    ) {
        debug_assert_eq!(out.num_slots(), self.elements.len());
        for &raw in indices {
            let idx = if raw >= max_index { 0 } else { raw };
            let slots = out.push_uninit();
            self.fetch_one(bufs, idx, instance_id, slots);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::VertexFormat;

    fn f32_buf(vals: &[f32]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn one_element() -> Vec<VertexElement> {
        vec![VertexElement {
            src_buffer: 0,
            src_offset: 0,
            src_stride: 8,
            instance_divisor: 0,
            format: VertexFormat::Float32x2,
        }]
    }

    #[test]
    fn linear_fetch_honors_stride() {
        let data = f32_buf(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let bufs_inner = [&data[..]];
        let bufs = VertexBuffers { buffers: &bufs_inner };
        let m = FetchMachine::new(&one_element(), 1).unwrap();
        let mut out = VertexBlock::new(1);
        m.fetch_linear(&bufs, 1, 2, 0, &mut out);
        assert_eq!(out.vertex(0)[0], [3.0, 4.0, 0.0, 1.0]);
        assert_eq!(out.vertex(1)[0], [5.0, 6.0, 0.0, 1.0]);
    }

    #[test]
    fn indexed_fetch_clamps_to_zero() {
        let data = f32_buf(&[10.0, 11.0, 20.0, 21.0]);
        let bufs_inner = [&data[..]];
        let bufs = VertexBuffers { buffers: &bufs_inner };
        let m = FetchMachine::new(&one_element(), 1).unwrap();
        assert_eq!(m.max_index(&bufs), 2);
        let mut out = VertexBlock::new(1);
        m.fetch_indexed(&bufs, &[1, 2, 999], 2, 0, &mut out);
        assert_eq!(out.vertex(0)[0], [20.0, 21.0, 0.0, 1.0]);
        // Both out-of-range indices resolve to vertex 0.
        assert_eq!(out.vertex(1)[0], [10.0, 11.0, 0.0, 1.0]);
        assert_eq!(out.vertex(2)[0], [10.0, 11.0, 0.0, 1.0]);
    }

    #[test]
    fn instance_divisor_overrides_vertex_index() {
        let data = f32_buf(&[0.0, 0.5, 1.0, 1.5]);
        let bufs_inner = [&data[..]];
        let bufs = VertexBuffers { buffers: &bufs_inner };
        let elements = vec![VertexElement {
            src_buffer: 0,
            src_offset: 0,
            src_stride: 4,
            instance_divisor: 2,
            format: VertexFormat::Float32,
        }];
        let m = FetchMachine::new(&elements, 1).unwrap();
        let mut out = VertexBlock::new(1);
        // instance 5, divisor 2 -> record 2, regardless of vertex index.
        m.fetch_linear(&bufs, 7, 2, 5, &mut out);
        assert_eq!(out.vertex(0)[0][0], 1.0);
        assert_eq!(out.vertex(1)[0][0], 1.0);
    }

    #[test]
    fn unbound_buffer_is_a_config_error() {
        let err = FetchMachine::new(&one_element(), 0).unwrap_err();
        assert!(matches!(err, DrawError::VertexBufferOutOfRange { .. }));
    }
}
