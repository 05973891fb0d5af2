//! Image decoding.
//!
//! Decoding happens on the loading worker; the result is a [`TextureSource`]
//! the device uploads later.

use image::GenericImageView;

use crate::{
    error::LoadError,
    gpu::{ColorSpace, TextureSource},
    resources::AssetRoot,
};

/// Decodes `bytes` into RGBA8. `file_name` labels the texture and its errors.
pub fn decode_texture(
    assets: &AssetRoot,
    file_name: &str,
    bytes: &[u8],
    color_space: ColorSpace,
) -> Result<TextureSource, LoadError> {
    let img = image::load_from_memory(bytes).map_err(|source| LoadError::Image {
        path: assets.path(file_name),
        source,
    })?;
    let (width, height) = img.dimensions();
    Ok(TextureSource {
        label: file_name.to_string(),
        width,
        height,
        layers: 1,
        color_space,
        pixels: img.to_rgba8().into_raw(),
    })
}

/// Splits a strip of six square faces into a cube texture.
///
/// Vertical strips (`height == 6 * width`) hold the faces top to bottom,
/// horizontal strips (`width == 6 * height`) left to right, both in the order
/// +X, -X, +Y, -Y, +Z, -Z.
pub fn decode_cube_strip(assets: &AssetRoot, file_name: &str, bytes: &[u8]) -> Result<TextureSource, LoadError> {
    let strip = decode_texture(assets, file_name, bytes, ColorSpace::Srgb)?;
    let (width, height) = (strip.width, strip.height);

    if height == 6 * width && width > 0 {
        // Rows are contiguous, so the faces already are consecutive layers.
        return Ok(TextureSource {
            height: width,
            layers: 6,
            ..strip
        });
    }
    if width == 6 * height && height > 0 {
        let face = height as usize;
        let row_bytes = width as usize * 4;
        let face_row_bytes = face * 4;
        let mut pixels = Vec::with_capacity(strip.pixels.len());
        for layer in 0..6 {
            for row in 0..face {
                let start = row * row_bytes + layer * face_row_bytes;
                pixels.extend_from_slice(&strip.pixels[start..start + face_row_bytes]);
            }
        }
        return Ok(TextureSource {
            width: height,
            height,
            layers: 6,
            pixels,
            ..strip
        });
    }

    Err(LoadError::parse(
        assets.path(file_name),
        format!("{width}x{height} is not a strip of six square cube faces"),
    ))
}

/// Reads and decodes a 2D texture.
pub fn load_texture(assets: &AssetRoot, file_name: &str, color_space: ColorSpace) -> Result<TextureSource, LoadError> {
    let bytes = assets.load_binary(file_name)?;
    decode_texture(assets, file_name, &bytes, color_space)
}
