//! Row-width packing for texture-backed arrays.
//!
//! Every flattened array the render backend samples goes through [`layout`],
//! so the offset math in the kernel (`x = i % width`, `y = i / width`) agrees
//! with the CPU encoder for all of them.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Size limits of the target texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureLimits {
    /// Largest addressable width or height.
    pub max_dim: usize,
    /// Row width used when the array is long enough to fill it.
    pub preferred_width: usize,
}

impl Default for TextureLimits {
    fn default() -> Self {
        Self {
            max_dim: 4096,
            preferred_width: 2048,
        }
    }
}

impl TextureLimits {
    /// Layout for `count` texels under these limits.
    #[inline]
    pub fn layout(&self, count: usize) -> Result<TextureLayout> {
        layout(count, self.max_dim, self.preferred_width)
    }
}

/// Texture dimensions chosen for one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureLayout {
    pub width: usize,
    pub height: usize,
}

impl TextureLayout {
    /// Texels the texture holds, including padding.
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.width * self.height
    }

    /// `(x, y)` texel coordinate of element `index`.
    #[inline]
    pub fn coord(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }
}

/// Choose `width = min(max_dim, preferred, count)` and `height = ceil(count / width)`.
///
/// Zero elements map to a 1x1 texture. Fails when the height would exceed
/// `max_dim`; the array does not fit the addressable format.
pub fn layout(count: usize, max_dim: usize, preferred_width: usize) -> Result<TextureLayout> {
    if max_dim == 0 || preferred_width == 0 {
        return Err(Error::settings(format!(
            "texture limits must be non-zero (max_dim={max_dim}, preferred_width={preferred_width})"
        )));
    }
    if count == 0 {
        return Ok(TextureLayout { width: 1, height: 1 });
    }
    let width = max_dim.min(preferred_width).min(count);
    let height = count.div_ceil(width);
    if height > max_dim {
        return Err(Error::LayoutOverflow {
            elements: count,
            max_dim,
            width,
            height,
        });
    }
    Ok(TextureLayout { width, height })
}

/// Array padded with zeroed texels to fill its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelBuffer<T: Pod> {
    pub layout: TextureLayout,
    /// Number of meaningful elements before the padding.
    pub len: usize,
    pub data: Vec<T>,
}

impl<T: Pod> TexelBuffer<T> {
    /// Raw bytes for upload.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

/// Lay out `texels` under `limits` and pad to a full rectangle.
pub fn pack<T: Pod>(texels: Vec<T>, limits: &TextureLimits) -> Result<TexelBuffer<T>> {
    let layout = limits.layout(texels.len())?;
    let len = texels.len();
    let mut data = texels;
    data.resize(layout.texel_count(), T::zeroed());
    Ok(TexelBuffer { layout, len, data })
}
