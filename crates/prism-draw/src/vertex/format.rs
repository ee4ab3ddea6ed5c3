use half::f16;

/// Source formats understood by the fetch machine.
///
/// Every format decodes to a canonical `[f32; 4]` attribute; components the
/// source does not supply default to `(0, 0, 0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Float16x2,
    Float16x4,
    Unorm8x4,
    Snorm8x4,
    Uint8x4,
    Sint8x4,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Snorm16x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Sint16x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    /// Declared format the pipeline does not understand. Decodes to all
    /// zeroes; reported once at fetch-machine build time.
    Unknown,
}

impl VertexFormat {
    pub fn byte_size(self) -> usize {
        match self {
            Self::Float32 | Self::Uint32 | Self::Sint32 => 4,
            Self::Float32x2 | Self::Uint32x2 | Self::Sint32x2 => 8,
            Self::Float32x3 | Self::Uint32x3 | Self::Sint32x3 => 12,
            Self::Float32x4 | Self::Uint32x4 | Self::Sint32x4 => 16,
            Self::Float16x2 => 4,
            Self::Float16x4 => 8,
            Self::Unorm8x4 | Self::Snorm8x4 | Self::Uint8x4 | Self::Sint8x4 => 4,
            Self::Unorm16x2 | Self::Snorm16x2 | Self::Uint16x2 | Self::Sint16x2 => 4,
            Self::Unorm16x4 | Self::Snorm16x4 | Self::Uint16x4 | Self::Sint16x4 => 8,
            Self::Unknown => 0,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[inline]
fn f32_at(bytes: &[u8], i: usize) -> f32 {
    let off = i * 4;
    f32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

#[inline]
fn u16_at(bytes: &[u8], i: usize) -> u16 {
    let off = i * 2;
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

#[inline]
fn u32_at(bytes: &[u8], i: usize) -> u32 {
    let off = i * 4;
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

#[inline]
fn snorm8(v: i8) -> f32 {
    (v as f32 / 127.0).max(-1.0)
}

#[inline]
fn snorm16(v: i16) -> f32 {
    (v as f32 / 32767.0).max(-1.0)
}

/// Decode one attribute's worth of bytes into the canonical float4 record.
///
/// `bytes` must hold at least `format.byte_size()` bytes; the fetch machine
/// guarantees this by clamping out-of-range indices before calling in.
/// Sources may be unaligned, so all reads are per-component `from_le_bytes`.
pub fn decode(format: VertexFormat, bytes: &[u8]) -> [f32; 4] {
    let mut out = [0.0, 0.0, 0.0, 1.0];
    match format {
        VertexFormat::Float32 => out[0] = f32_at(bytes, 0),
        VertexFormat::Float32x2 => {
            out[0] = f32_at(bytes, 0);
            out[1] = f32_at(bytes, 1);
        }
        VertexFormat::Float32x3 => {
            out[0] = f32_at(bytes, 0);
            out[1] = f32_at(bytes, 1);
            out[2] = f32_at(bytes, 2);
        }
        VertexFormat::Float32x4 => {
            for c in 0..4 {
                out[c] = f32_at(bytes, c);
            }
        }
        VertexFormat::Float16x2 => {
            out[0] = f16::from_bits(u16_at(bytes, 0)).to_f32();
            out[1] = f16::from_bits(u16_at(bytes, 1)).to_f32();
        }
        VertexFormat::Float16x4 => {
            for c in 0..4 {
                out[c] = f16::from_bits(u16_at(bytes, c)).to_f32();
            }
        }
        VertexFormat::Unorm8x4 => {
            for c in 0..4 {
                out[c] = bytes[c] as f32 / 255.0;
            }
        }
        VertexFormat::Snorm8x4 => {
            for c in 0..4 {
                out[c] = snorm8(bytes[c] as i8);
            }
        }
        VertexFormat::Uint8x4 => {
            for c in 0..4 {
                out[c] = bytes[c] as f32;
            }
        }
        VertexFormat::Sint8x4 => {
            for c in 0..4 {
                out[c] = (bytes[c] as i8) as f32;
            }
        }
        VertexFormat::Unorm16x2 => {
            out[0] = u16_at(bytes, 0) as f32 / 65535.0;
            out[1] = u16_at(bytes, 1) as f32 / 65535.0;
        }
        VertexFormat::Unorm16x4 => {
            for c in 0..4 {
                out[c] = u16_at(bytes, c) as f32 / 65535.0;
            }
        }
        VertexFormat::Snorm16x2 => {
            out[0] = snorm16(u16_at(bytes, 0) as i16);
            out[1] = snorm16(u16_at(bytes, 1) as i16);
        }
        VertexFormat::Snorm16x4 => {
            for c in 0..4 {
                out[c] = snorm16(u16_at(bytes, c) as i16);
            }
        }
        VertexFormat::Uint16x2 => {
            out[0] = u16_at(bytes, 0) as f32;
            out[1] = u16_at(bytes, 1) as f32;
        }
        VertexFormat::Uint16x4 => {
            for c in 0..4 {
                out[c] = u16_at(bytes, c) as f32;
            }
        }
        VertexFormat::Sint16x2 => {
            out[0] = (u16_at(bytes, 0) as i16) as f32;
            out[1] = (u16_at(bytes, 1) as i16) as f32;
        }
        VertexFormat::Sint16x4 => {
            for c in 0..4 {
                out[c] = (u16_at(bytes, c) as i16) as f32;
            }
        }
        VertexFormat::Uint32 => out[0] = u32_at(bytes, 0) as f32,
        VertexFormat::Uint32x2 => {
            out[0] = u32_at(bytes, 0) as f32;
            out[1] = u32_at(bytes, 1) as f32;
        }
        VertexFormat::Uint32x3 => {
            out[0] = u32_at(bytes, 0) as f32;
            out[1] = u32_at(bytes, 1) as f32;
            out[2] = u32_at(bytes, 2) as f32;
        }
        VertexFormat::Uint32x4 => {
            for c in 0..4 {
                out[c] = u32_at(bytes, c) as f32;
            }
        }
        VertexFormat::Sint32 => out[0] = u32_at(bytes, 0) as i32 as f32,
        VertexFormat::Sint32x2 => {
            out[0] = u32_at(bytes, 0) as i32 as f32;
            out[1] = u32_at(bytes, 1) as i32 as f32;
        }
        VertexFormat::Sint32x3 => {
            out[0] = u32_at(bytes, 0) as i32 as f32;
            out[1] = u32_at(bytes, 1) as i32 as f32;
            out[2] = u32_at(bytes, 2) as i32 as f32;
        }
        VertexFormat::Sint32x4 => {
            for c in 0..4 {
                out[c] = u32_at(bytes, c) as i32 as f32;
            }
        }
        VertexFormat::Unknown => out = [0.0; 4],
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formats_default_missing_components() {
        let bytes = 2.5f32.to_le_bytes();
        assert_eq!(decode(VertexFormat::Float32, &bytes), [2.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unorm8_full_range() {
        assert_eq!(
            decode(VertexFormat::Unorm8x4, &[0, 255, 0, 255]),
            [0.0, 1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn snorm_clamps_negative_extreme() {
        // -128 and -127 both map to -1.0.
        let v = decode(VertexFormat::Snorm8x4, &[0x80, 0x81, 0x7F, 0x00]);
        assert_eq!(v[0], -1.0);
        assert_eq!(v[1], -1.0);
        assert_eq!(v[2], 1.0);
    }

    #[test]
    fn f16_decodes() {
        let one = f16::from_f32(1.0).to_bits().to_le_bytes();
        let half_ = f16::from_f32(0.5).to_bits().to_le_bytes();
        let bytes = [one[0], one[1], half_[0], half_[1]];
        assert_eq!(decode(VertexFormat::Float16x2, &bytes), [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn unknown_decodes_to_zero() {
        assert_eq!(decode(VertexFormat::Unknown, &[]), [0.0; 4]);
    }
}
