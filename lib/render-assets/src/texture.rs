//! The texture binary format: a fixed header followed by the packed texel
//! data, optionally with the full mip chain appended smallest-last. The
//! loader hands the data straight to the renderer's texture factory without
//! per-frame parsing.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::FromPrimitive;
use render_backend_traits::traits::RenderBackend;
use render_backend_traits::types::{Texture2dArrayDescriptor, Texture2dDescriptor};
use render_types::types::{ResourceId, TextureFormat};

use crate::header::{read_and_check_header, write_header};
use crate::AssetLoadError;

pub const TEXTURE_FORMAT_TYPE: &[u8; 4] = b"TEX1";
pub const TEXTURE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureResource {
    pub width: u32,
    pub height: u32,
    /// 1 for a plain 2D texture, more for a 2D array.
    pub number_of_slices: u32,
    pub texture_format: TextureFormat,
    /// Data carries the complete mip chain, largest level first.
    pub data_contains_mipmaps: bool,
    pub data: Vec<u8>,
}

impl TextureResource {
    /// Bytes one slice occupies, mip chain included when present. Block
    /// compressed formats count 4x4 texel blocks (8 bytes for BC1, 16
    /// otherwise).
    pub fn bytes_per_slice(&self) -> usize {
        let mut total = 0;
        let mut width = self.width.max(1);
        let mut height = self.height.max(1);
        loop {
            total += level_size(width, height, self.texture_format);
            if !self.data_contains_mipmaps || (width == 1 && height == 1) {
                return total;
            }
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
    }

    /// Creates the renderer-side texture object; a 2D array when the asset
    /// carries more than one slice.
    pub fn upload(&self, backend: &mut dyn RenderBackend) -> Option<ResourceId> {
        if self.number_of_slices > 1 {
            backend.create_texture_2d_array(
                &Texture2dArrayDescriptor {
                    width: self.width,
                    height: self.height,
                    number_of_slices: self.number_of_slices,
                    texture_format: self.texture_format,
                    mipmaps: self.data_contains_mipmaps,
                    render_target: false,
                    multisample_count: 1,
                },
                Some(&self.data),
            )
        } else {
            backend.create_texture_2d(
                &Texture2dDescriptor {
                    width: self.width,
                    height: self.height,
                    texture_format: self.texture_format,
                    mipmaps: self.data_contains_mipmaps,
                    render_target: false,
                    multisample_count: 1,
                },
                Some(&self.data),
            )
        }
    }
}

fn level_size(width: u32, height: u32, format: TextureFormat) -> usize {
    match format.bytes_per_texel() {
        Some(bytes_per_texel) => width as usize * height as usize * bytes_per_texel,
        None => {
            let blocks = (((width + 3) >> 2) * ((height + 3) >> 2)) as usize;
            let block_size = if format == TextureFormat::Bc1 { 8 } else { 16 };
            blocks * block_size
        }
    }
}

pub fn load_texture(reader: &mut impl Read) -> Result<TextureResource, AssetLoadError> {
    read_and_check_header(reader, TEXTURE_FORMAT_TYPE, TEXTURE_FORMAT_VERSION)?;
    let width = reader.read_u32::<LittleEndian>()?;
    let height = reader.read_u32::<LittleEndian>()?;
    let number_of_slices = reader.read_u32::<LittleEndian>()?;
    let format_raw = reader.read_u32::<LittleEndian>()?;
    let texture_format = TextureFormat::from_u32(format_raw)
        .ok_or_else(|| AssetLoadError::Corrupt(format!("unknown texture format {format_raw}")))?;
    let data_contains_mipmaps = reader.read_u32::<LittleEndian>()? != 0;

    if width == 0 || height == 0 || number_of_slices == 0 {
        return Err(AssetLoadError::Corrupt(
            "texture extent must not be zero".into(),
        ));
    }
    let mut texture = TextureResource {
        width,
        height,
        number_of_slices,
        texture_format,
        data_contains_mipmaps,
        data: Vec::new(),
    };
    let total = texture
        .bytes_per_slice()
        .checked_mul(number_of_slices as usize)
        .ok_or_else(|| AssetLoadError::Corrupt("texture data size overflows".into()))?;
    let mut data = vec![0u8; total];
    reader.read_exact(&mut data)?;
    texture.data = data;
    Ok(texture)
}

pub fn write_texture(
    writer: &mut impl Write,
    texture: &TextureResource,
) -> Result<(), AssetLoadError> {
    let expected = texture.bytes_per_slice() * texture.number_of_slices as usize;
    if texture.data.len() != expected {
        return Err(AssetLoadError::Corrupt(format!(
            "texture data is {} bytes, the header describes {expected}",
            texture.data.len()
        )));
    }
    write_header(writer, TEXTURE_FORMAT_TYPE, TEXTURE_FORMAT_VERSION)?;
    writer.write_u32::<LittleEndian>(texture.width)?;
    writer.write_u32::<LittleEndian>(texture.height)?;
    writer.write_u32::<LittleEndian>(texture.number_of_slices)?;
    writer.write_u32::<LittleEndian>(texture.texture_format as u32)?;
    writer.write_u32::<LittleEndian>(texture.data_contains_mipmaps as u32)?;
    writer.write_all(&texture.data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_sizes_sum_per_slice() {
        let texture = TextureResource {
            width: 4,
            height: 4,
            number_of_slices: 1,
            texture_format: TextureFormat::Rgba8,
            data_contains_mipmaps: true,
            data: Vec::new(),
        };
        // 4x4 + 2x2 + 1x1, four bytes each.
        assert_eq!(texture.bytes_per_slice(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn bc1_levels_count_in_blocks() {
        let texture = TextureResource {
            width: 8,
            height: 8,
            number_of_slices: 1,
            texture_format: TextureFormat::Bc1,
            data_contains_mipmaps: false,
            data: Vec::new(),
        };
        assert_eq!(texture.bytes_per_slice(), 4 * 8);
    }

    #[test]
    fn texture_round_trip() {
        let mut texture = TextureResource {
            width: 2,
            height: 2,
            number_of_slices: 3,
            texture_format: TextureFormat::Rgba8,
            data_contains_mipmaps: false,
            data: Vec::new(),
        };
        texture.data = (0..texture.bytes_per_slice() * 3).map(|byte| byte as u8).collect();

        let mut bytes = Vec::new();
        write_texture(&mut bytes, &texture).unwrap();
        assert_eq!(&bytes[0..4], b"TEX1");
        assert_eq!(load_texture(&mut bytes.as_slice()).unwrap(), texture);
    }

    #[test]
    fn truncated_texture_data_is_an_io_error() {
        let texture = TextureResource {
            width: 2,
            height: 2,
            number_of_slices: 1,
            texture_format: TextureFormat::Rgba8,
            data_contains_mipmaps: false,
            data: vec![0; 16],
        };
        let mut bytes = Vec::new();
        write_texture(&mut bytes, &texture).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            load_texture(&mut bytes.as_slice()),
            Err(AssetLoadError::Io(_))
        ));
    }
}
