// SPDX-License-Identifier: GPL-3.0-only

//! Raw render buffer files and PNG previews
//!
//! The raw format is a fixed 32-byte header followed by the float payload in
//! native byte order:
//!
//! ```text
//! magic "LWRBUF\0\0" | version | width | height | samples | light passes | pass stride
//! f32 × width × height × pass_stride
//! ```

use super::{LightPasses, PassKind, RenderBuffers};
use crate::errors::{AppResult, BufferError};
use image::RgbImage;
use std::path::Path;
use tracing::{debug, info};

const MAGIC: [u8; 8] = *b"LWRBUF\0\0";
const VERSION: u32 = 1;

/// On-disk header of a raw buffer file
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub light_passes: u32,
    pub pass_stride: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<RawHeader>();
const _: () = assert!(HEADER_SIZE == 32);

/// Serialize a buffer together with its sample count
pub fn encode_raw(buffers: &RenderBuffers, samples: u32) -> Vec<u8> {
    let header = RawHeader {
        magic: MAGIC,
        version: VERSION,
        width: buffers.width() as u32,
        height: buffers.height() as u32,
        samples,
        light_passes: buffers.layout().passes().bits() as u32,
        pass_stride: buffers.layout().pass_stride as u32,
    };
    let payload: &[u8] = bytemuck::cast_slice(buffers.data());
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(payload);
    bytes
}

/// Parse a buffer and its sample count from raw bytes
pub fn decode_raw(bytes: &[u8]) -> Result<(RenderBuffers, u32), BufferError> {
    if bytes.len() < HEADER_SIZE {
        return Err(BufferError::Truncated);
    }
    let header: RawHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
    if header.magic != MAGIC {
        return Err(BufferError::BadMagic);
    }
    if header.version != VERSION {
        return Err(BufferError::UnsupportedVersion(header.version));
    }

    let passes = LightPasses::try_from_bits(header.light_passes)
        .ok_or(BufferError::UnknownPasses(header.light_passes))?;
    let expected_stride = super::PassLayout::new(passes).pass_stride;
    if header.pass_stride as usize != expected_stride {
        return Err(BufferError::StrideMismatch {
            expected: expected_stride,
            actual: header.pass_stride as usize,
        });
    }

    let payload = &bytes[HEADER_SIZE..];
    // A size that overflows can never be backed by the payload
    let byte_len = (header.width as usize)
        .checked_mul(header.height as usize)
        .and_then(|pixels| pixels.checked_mul(expected_stride))
        .and_then(|floats| floats.checked_mul(std::mem::size_of::<f32>()))
        .ok_or(BufferError::Truncated)?;
    if payload.len() < byte_len {
        return Err(BufferError::Truncated);
    }
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(&payload[..byte_len]);

    let buffers =
        RenderBuffers::from_data(header.width as usize, header.height as usize, passes, data)?;
    Ok((buffers, header.samples))
}

pub fn write_raw(path: &Path, buffers: &RenderBuffers, samples: u32) -> AppResult<()> {
    let bytes = encode_raw(buffers, samples);
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "Wrote render buffer");
    Ok(())
}

pub fn read_raw(path: &Path) -> AppResult<(RenderBuffers, u32)> {
    let bytes = std::fs::read(path)?;
    let (buffers, samples) = decode_raw(&bytes)?;
    debug!(
        path = %path.display(),
        width = buffers.width(),
        height = buffers.height(),
        samples,
        "Read render buffer"
    );
    Ok((buffers, samples))
}

/// Convert a linear value to an 8-bit sRGB channel
fn linear_to_srgb8(value: f32) -> u8 {
    let v = value.clamp(0.0, 1.0);
    let encoded = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round() as u8
}

/// Render a pass as an 8-bit sRGB preview image.
///
/// Single-channel passes are normalized by their largest finite value and
/// shown as gray.
pub fn pass_preview(buffers: &RenderBuffers, pass: PassKind, samples: u32) -> Option<RgbImage> {
    let pixels = buffers.pass_rect(pass, samples)?;
    let components = pass.components();
    let (width, height) = (buffers.width() as u32, buffers.height() as u32);

    let image = if components == 1 {
        let peak = pixels
            .iter()
            .copied()
            .filter(|v| v.is_finite() && *v < 1e9)
            .fold(0.0f32, f32::max)
            .max(f32::MIN_POSITIVE);
        RgbImage::from_fn(width, height, |x, y| {
            let v = pixels[(y * width + x) as usize] / peak;
            let c = linear_to_srgb8(v);
            image::Rgb([c, c, c])
        })
    } else {
        RgbImage::from_fn(width, height, |x, y| {
            let i = (y * width + x) as usize * components;
            image::Rgb([
                linear_to_srgb8(pixels[i]),
                linear_to_srgb8(pixels[i + 1]),
                linear_to_srgb8(pixels[i + 2]),
            ])
        })
    };
    Some(image)
}

/// Save a pass preview as PNG
pub fn save_png(
    path: &Path,
    buffers: &RenderBuffers,
    pass: PassKind,
    samples: u32,
) -> AppResult<()> {
    let image = pass_preview(buffers, pass, samples).ok_or_else(|| {
        crate::errors::FilterError::PassNotInLayout(format!("{:?}", pass))
    })?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    info!(path = %path.display(), ?pass, "Saved preview");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::LightPass;

    #[test]
    fn test_raw_round_trip_preserves_layout() {
        let passes: LightPasses = [LightPass::DiffuseIndirect].into_iter().collect();
        let mut buffers = RenderBuffers::new(3, 2, passes).unwrap();
        buffers.pixel_mut(2, 1).set_combined([1.0, 2.0, 3.0, 4.0]);

        let bytes = encode_raw(&buffers, 17);
        let (decoded, samples) = decode_raw(&bytes).unwrap();
        assert_eq!(samples, 17);
        assert_eq!(decoded.layout(), buffers.layout());
        assert_eq!(decoded.data(), buffers.data());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_raw(&[0u8; 4]).unwrap_err(), BufferError::Truncated);
        assert_eq!(decode_raw(&[0u8; 64]).unwrap_err(), BufferError::BadMagic);

        let buffers = RenderBuffers::new(2, 2, LightPasses::NONE).unwrap();
        let bytes = encode_raw(&buffers, 1);
        assert_eq!(
            decode_raw(&bytes[..bytes.len() - 4]).unwrap_err(),
            BufferError::Truncated
        );
    }

    fn header_bytes(width: u32, height: u32, light_passes: u32, pass_stride: u32) -> Vec<u8> {
        let header = RawHeader {
            magic: MAGIC,
            version: VERSION,
            width,
            height,
            samples: 4,
            light_passes,
            pass_stride,
        };
        bytemuck::bytes_of(&header).to_vec()
    }

    #[test]
    fn test_decode_rejects_oversized_header() {
        let stride = crate::buffers::PassLayout::new(LightPasses::NONE).pass_stride as u32;
        let bytes = header_bytes(u32::MAX, u32::MAX, 0, stride);
        assert_eq!(decode_raw(&bytes).unwrap_err(), BufferError::Truncated);

        let all = LightPasses::all();
        let stride = crate::buffers::PassLayout::new(all).pass_stride as u32;
        let bytes = header_bytes(u32::MAX, 3, all.bits() as u32, stride);
        assert_eq!(decode_raw(&bytes).unwrap_err(), BufferError::Truncated);
    }

    #[test]
    fn test_decode_rejects_unknown_pass_bits() {
        let bytes = header_bytes(1, 1, 0x101, 28);
        assert_eq!(decode_raw(&bytes).unwrap_err(), BufferError::UnknownPasses(0x101));
        let bytes = header_bytes(1, 1, 1, 28);
        assert_eq!(decode_raw(&bytes).unwrap_err(), BufferError::UnknownPasses(1));
    }

    #[test]
    fn test_srgb_encoding_endpoints() {
        assert_eq!(linear_to_srgb8(0.0), 0);
        assert_eq!(linear_to_srgb8(1.0), 255);
        assert_eq!(linear_to_srgb8(4.0), 255);
        assert!(linear_to_srgb8(0.5) > 128);
    }
}
