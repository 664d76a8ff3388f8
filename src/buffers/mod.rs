// SPDX-License-Identifier: GPL-3.0-only

//! Render buffers consumed and written by the filter
//!
//! A render buffer is a dense row-major array of per-pixel records of
//! `pass_stride` floats. The [`PassLayout`] says where every pass lives inside
//! a record; [`PixelRef`] and [`PixelMut`] wrap the stride arithmetic so the
//! filter reads `pixel.depth_mean()` instead of computing offsets.
//!
//! Mean slots hold running sums over samples and variance slots hold running
//! sums of `(x - mean_old)·(x - mean_new)`. Readers scale by `1/samples` (and
//! `1/(samples - 1)` for variances) themselves.

pub mod accumulate;
pub mod io;

pub use accumulate::SampleFeatures;

use crate::constants::LWR_BLOCK_FLOATS;
use crate::errors::BufferError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Light passes that can be filtered in addition to the combined pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LightPass {
    DiffuseDirect,
    DiffuseIndirect,
    GlossyDirect,
    GlossyIndirect,
    TransmissionDirect,
    TransmissionIndirect,
}

impl LightPass {
    /// All light passes in filtering order
    pub const ALL: [LightPass; 6] = [
        LightPass::DiffuseDirect,
        LightPass::DiffuseIndirect,
        LightPass::GlossyDirect,
        LightPass::GlossyIndirect,
        LightPass::TransmissionDirect,
        LightPass::TransmissionIndirect,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit of this pass in the light-pass mask (bit 0 is reserved for the
    /// feature block itself)
    pub fn bit(self) -> u8 {
        1 << (self.index() + 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            LightPass::DiffuseDirect => "diffuse_direct",
            LightPass::DiffuseIndirect => "diffuse_indirect",
            LightPass::GlossyDirect => "glossy_direct",
            LightPass::GlossyIndirect => "glossy_indirect",
            LightPass::TransmissionDirect => "transmission_direct",
            LightPass::TransmissionIndirect => "transmission_indirect",
        }
    }
}

/// Bitmask of enabled light passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightPasses(u8);

impl LightPasses {
    const MASK: u8 = 0b0111_1110;

    pub const NONE: LightPasses = LightPasses(0);

    /// Build from a stored mask, rejecting bits that name no light pass
    pub fn try_from_bits(bits: u32) -> Option<Self> {
        u8::try_from(bits)
            .ok()
            .filter(|b| b & !Self::MASK == 0)
            .map(Self)
    }

    pub fn all() -> Self {
        Self(Self::MASK)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, pass: LightPass) -> bool {
        self.0 & pass.bit() != 0
    }

    pub fn insert(&mut self, pass: LightPass) {
        self.0 |= pass.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Enabled passes in filtering order
    pub fn iter(self) -> impl Iterator<Item = LightPass> {
        LightPass::ALL.into_iter().filter(move |pass| self.contains(*pass))
    }
}

impl FromIterator<LightPass> for LightPasses {
    fn from_iter<I: IntoIterator<Item = LightPass>>(iter: I) -> Self {
        let mut passes = LightPasses::NONE;
        for pass in iter {
            passes.insert(pass);
        }
        passes
    }
}

/// Offsets of a 3-channel color pass and its variance inside a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSlots {
    pub mean: usize,
    pub variance: usize,
}

/// Per-record offsets of every pass
///
/// Regular passes come first (combined RGBA, the bandwidth diagnostic, then
/// one RGB sum per enabled light pass), followed by the LWR feature block and
/// one RGB variance per enabled light pass. The stride is padded to a
/// multiple of four floats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassLayout {
    pub pass_stride: usize,
    /// Combined RGBA; also the output slot of the filter
    pub combined: usize,
    /// Bandwidth chosen by the reconstruction, times the sample count
    pub bandwidth: usize,
    /// Start of the LWR feature block
    pub lwr: usize,
    light: [Option<ColorSlots>; 6],
    passes: LightPasses,
}

impl PassLayout {
    pub fn new(passes: LightPasses) -> Self {
        let combined = 0;
        let bandwidth = 4;
        let mut size = 5;

        let mut means = [0usize; 6];
        for pass in passes.iter() {
            means[pass.index()] = size;
            size += 3;
        }

        let lwr = size;
        size += LWR_BLOCK_FLOATS;

        let mut light = [None; 6];
        for pass in passes.iter() {
            light[pass.index()] = Some(ColorSlots {
                mean: means[pass.index()],
                variance: size,
            });
            size += 3;
        }

        Self {
            pass_stride: size.next_multiple_of(4),
            combined,
            bandwidth,
            lwr,
            light,
            passes,
        }
    }

    pub fn passes(&self) -> LightPasses {
        self.passes
    }

    pub fn depth_mean(&self) -> usize {
        self.lwr
    }

    pub fn depth_variance(&self) -> usize {
        self.lwr + 1
    }

    pub fn normal_mean(&self) -> usize {
        self.lwr + 2
    }

    pub fn normal_variance(&self) -> usize {
        self.lwr + 5
    }

    pub fn tangent_mean(&self) -> usize {
        self.lwr + 8
    }

    pub fn tangent_variance(&self) -> usize {
        self.lwr + 11
    }

    /// Combined radiance as tracked inside the feature block
    pub fn combined_color(&self) -> ColorSlots {
        ColorSlots {
            mean: self.lwr + 14,
            variance: self.lwr + 17,
        }
    }

    pub fn light(&self, pass: LightPass) -> Option<ColorSlots> {
        self.light[pass.index()]
    }
}

/// Passes that can be read back as images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Combined,
    Bandwidth,
    Depth,
    Normal,
    Tangent,
    Light(LightPass),
}

impl PassKind {
    pub fn components(self) -> usize {
        match self {
            PassKind::Combined => 4,
            PassKind::Bandwidth | PassKind::Depth => 1,
            PassKind::Normal | PassKind::Tangent | PassKind::Light(_) => 3,
        }
    }
}

/// Rectangular unit of filter work in buffer pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Tile {
    pub fn new(x: usize, y: usize, w: usize, h: usize) -> Self {
        Self { x, y, w, h }
    }

    pub fn len(&self) -> usize {
        self.w * self.h
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a signed coordinate lies inside `[x, x+w) × [y, y+h)`
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x as i64
            && x < (self.x + self.w) as i64
            && y >= self.y as i64
            && y < (self.y + self.h) as i64
    }

    /// Row-major index of a pixel inside the tile
    pub fn index_of(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.contains(x as i64, y as i64));
        (y - self.y) * self.w + (x - self.x)
    }

    /// Pixel coordinate of a row-major tile index
    pub fn pixel_at(&self, index: usize) -> (usize, usize) {
        (self.x + index % self.w, self.y + index / self.w)
    }

    /// Split a `width × height` image into `size × size` tiles, row by row.
    /// Tiles on the right and bottom edges are clipped.
    pub fn grid(width: usize, height: usize, size: usize) -> Vec<Tile> {
        let nx = width.div_ceil(size);
        let ny = height.div_ceil(size);
        let mut tiles = Vec::with_capacity(nx * ny);
        for iy in 0..ny {
            for ix in 0..nx {
                let x = ix * size;
                let y = iy * size;
                tiles.push(Tile::new(x, y, size.min(width - x), size.min(height - y)));
            }
        }
        tiles
    }
}

/// Image dimensions and pass layout of a render buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferParams {
    pub width: usize,
    pub height: usize,
    pub layout: PassLayout,
}

/// Per-pixel pass records for a whole image
#[derive(Debug, Clone)]
pub struct RenderBuffers {
    params: BufferParams,
    data: Vec<f32>,
}

impl RenderBuffers {
    /// Zero-initialized buffer for the given light passes
    pub fn new(width: usize, height: usize, passes: LightPasses) -> Result<Self, BufferError> {
        let layout = PassLayout::new(passes);
        Self::check_dimensions(width, height)?;
        let data = vec![0.0; width * height * layout.pass_stride];
        Ok(Self {
            params: BufferParams {
                width,
                height,
                layout,
            },
            data,
        })
    }

    /// Wrap existing pass data
    pub fn from_data(
        width: usize,
        height: usize,
        passes: LightPasses,
        data: Vec<f32>,
    ) -> Result<Self, BufferError> {
        Self::check_dimensions(width, height)?;
        let layout = PassLayout::new(passes);
        let expected = width * height * layout.pass_stride;
        if data.len() != expected {
            return Err(BufferError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            params: BufferParams {
                width,
                height,
                layout,
            },
            data,
        })
    }

    fn check_dimensions(width: usize, height: usize) -> Result<(), BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::InvalidDimensions { width, height });
        }
        Ok(())
    }

    pub fn params(&self) -> &BufferParams {
        &self.params
    }

    pub fn width(&self) -> usize {
        self.params.width
    }

    pub fn height(&self) -> usize {
        self.params.height
    }

    pub fn layout(&self) -> &PassLayout {
        &self.params.layout
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn record_range(&self, x: usize, y: usize) -> std::ops::Range<usize> {
        debug_assert!(x < self.params.width && y < self.params.height);
        let stride = self.params.layout.pass_stride;
        let start = (y * self.params.width + x) * stride;
        start..start + stride
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> PixelRef<'_> {
        let range = self.record_range(x, y);
        PixelRef {
            record: &self.data[range],
            layout: &self.params.layout,
        }
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> PixelMut<'_> {
        let range = self.record_range(x, y);
        PixelMut {
            record: &mut self.data[range],
            layout: &self.params.layout,
        }
    }

    /// Read a pass back as per-sample values, `components` floats per pixel.
    ///
    /// Depth pixels that never received a sample read as `1e10`. Returns
    /// `None` for a light pass the layout does not carry.
    pub fn pass_rect(&self, pass: PassKind, samples: u32) -> Option<Vec<f32>> {
        let layout = &self.params.layout;
        let offset = match pass {
            PassKind::Combined => layout.combined,
            PassKind::Bandwidth => layout.bandwidth,
            PassKind::Depth => layout.depth_mean(),
            PassKind::Normal => layout.normal_mean(),
            PassKind::Tangent => layout.tangent_mean(),
            PassKind::Light(light) => layout.light(light)?.mean,
        };
        let components = pass.components();
        let scale = 1.0 / samples.max(1) as f32;

        let mut pixels = Vec::with_capacity(self.params.width * self.params.height * components);
        for record in self.data.chunks_exact(layout.pass_stride) {
            let values = &record[offset..offset + components];
            if pass == PassKind::Depth {
                let depth = values[0];
                pixels.push(if depth == 0.0 { 1e10 } else { depth * scale });
            } else {
                pixels.extend(values.iter().map(|v| v * scale));
            }
        }
        Some(pixels)
    }
}

/// Read access to one pixel record
#[derive(Clone, Copy)]
pub struct PixelRef<'a> {
    record: &'a [f32],
    layout: &'a PassLayout,
}

impl<'a> PixelRef<'a> {
    #[inline]
    fn vec3(&self, offset: usize) -> Vec3 {
        Vec3::from_slice(&self.record[offset..offset + 3])
    }

    pub fn depth_mean(&self) -> f32 {
        self.record[self.layout.depth_mean()]
    }

    pub fn depth_variance(&self) -> f32 {
        self.record[self.layout.depth_variance()]
    }

    pub fn normal_mean(&self) -> Vec3 {
        self.vec3(self.layout.normal_mean())
    }

    pub fn normal_variance(&self) -> Vec3 {
        self.vec3(self.layout.normal_variance())
    }

    pub fn tangent_mean(&self) -> Vec3 {
        self.vec3(self.layout.tangent_mean())
    }

    pub fn tangent_variance(&self) -> Vec3 {
        self.vec3(self.layout.tangent_variance())
    }

    pub fn color_mean(&self, slots: ColorSlots) -> Vec3 {
        self.vec3(slots.mean)
    }

    pub fn color_variance(&self, slots: ColorSlots) -> Vec3 {
        self.vec3(slots.variance)
    }

    pub fn combined(&self) -> [f32; 4] {
        let c = self.layout.combined;
        [
            self.record[c],
            self.record[c + 1],
            self.record[c + 2],
            self.record[c + 3],
        ]
    }

    pub fn bandwidth(&self) -> f32 {
        self.record[self.layout.bandwidth]
    }
}

/// Write access to one pixel record
pub struct PixelMut<'a> {
    record: &'a mut [f32],
    layout: &'a PassLayout,
}

impl<'a> PixelMut<'a> {
    pub fn layout(&self) -> &PassLayout {
        self.layout
    }

    pub fn set_combined(&mut self, rgba: [f32; 4]) {
        let c = self.layout.combined;
        self.record[c..c + 4].copy_from_slice(&rgba);
    }

    /// Overwrite the color channels of the combined slot, keeping alpha
    pub fn set_combined_rgb(&mut self, rgb: [f32; 3]) {
        let c = self.layout.combined;
        self.record[c..c + 3].copy_from_slice(&rgb);
    }

    pub fn add_combined(&mut self, rgba: [f32; 4]) {
        let c = self.layout.combined;
        for (slot, value) in self.record[c..c + 4].iter_mut().zip(rgba) {
            *slot += value;
        }
    }

    pub fn set_bandwidth(&mut self, value: f32) {
        self.record[self.layout.bandwidth] = value;
    }

    /// Raw float at `offset` within the record
    pub fn slot_mut(&mut self, offset: usize) -> &mut f32 {
        &mut self.record[offset]
    }
}
