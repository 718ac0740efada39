//! The material-blueprint binary format, sections in file order: header,
//! property array, visual-importance table, maximum-integer-value table,
//! root-signature block, pipeline-state block, uniform-buffer blocks,
//! texture-buffer blocks, sampler-state array, texture-binding array.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use material::blueprint::{
    BufferUsageSemantic, MaterialBlueprint, SamplerStateDefinition, ShaderStageAssets,
    TextureBufferDefinition, TextureDefinition, UniformBufferDefinition,
};
use material::property::{
    AssetId, MaterialProperties, MaterialProperty, MaterialPropertyId, MaterialPropertyUsage,
    MaterialPropertyValue, MaterialPropertyValueType, UNINITIALIZED_ID,
};
use material::shader_properties::ShaderProperties;
use num_traits::FromPrimitive;
use render_types::pipeline_state::{
    Blend, BlendOp, BlendState, ConservativeRasterizationMode, CullMode, DepthStencilState,
    DepthWriteMask, FillMode, RasterizerState, RenderTargetBlendDesc, StencilOp, StencilOpDesc,
    MAXIMUM_NUMBER_OF_RENDER_TARGETS,
};
use render_types::root_signature::{
    DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureDescriptor,
    RootSignatureFlags, ShaderVisibility, StaticSampler,
};
use render_types::sampler::{ComparisonFunc, FilterMode, SamplerStateDescriptor, TextureAddressMode};
use render_types::types::PrimitiveTopology;

use crate::asset_ids::AssetIdMapping;
use crate::header::{read_and_check_header, read_fixed_string, write_fixed_string, write_header};
use crate::mesh::{read_vertex_attribute, write_vertex_attribute};
use crate::AssetLoadError;

pub const MATERIAL_BLUEPRINT_FORMAT_TYPE: &[u8; 4] = b"MBR1";
pub const MATERIAL_BLUEPRINT_FORMAT_VERSION: u32 = 2;

/// One on-disk material property: id, usage, value tag, 16-byte value blob.
pub const MATERIAL_PROPERTY_RECORD_SIZE: usize = 28;

fn corrupt(message: impl Into<String>) -> AssetLoadError {
    AssetLoadError::Corrupt(message.into())
}

fn read_enum<T: FromPrimitive>(reader: &mut impl Read, what: &str) -> Result<T, AssetLoadError> {
    let raw = reader.read_u32::<LittleEndian>()?;
    T::from_u32(raw).ok_or_else(|| corrupt(format!("unknown {what} value {raw}")))
}

fn read_bool(reader: &mut impl Read) -> Result<bool, AssetLoadError> {
    Ok(reader.read_u32::<LittleEndian>()? != 0)
}

fn write_bool(writer: &mut impl Write, value: bool) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(value as u32)?;
    Ok(())
}

// ---- material property records -------------------------------------------

fn decode_property_value(
    value_type: MaterialPropertyValueType,
    blob: &[u8; 16],
) -> Result<MaterialPropertyValue, AssetLoadError> {
    let u = |index: usize| u32::from_le_bytes(blob[index * 4..index * 4 + 4].try_into().unwrap_or([0; 4]));
    let i = |index: usize| u(index) as i32;
    let f = |index: usize| f32::from_bits(u(index));
    let value = match value_type {
        MaterialPropertyValueType::Boolean => MaterialPropertyValue::Boolean(u(0) != 0),
        MaterialPropertyValueType::Integer => MaterialPropertyValue::Integer(i(0)),
        MaterialPropertyValueType::Integer2 => MaterialPropertyValue::Integer2([i(0), i(1)]),
        MaterialPropertyValueType::Integer3 => MaterialPropertyValue::Integer3([i(0), i(1), i(2)]),
        MaterialPropertyValueType::Integer4 => {
            MaterialPropertyValue::Integer4([i(0), i(1), i(2), i(3)])
        }
        MaterialPropertyValueType::Float => MaterialPropertyValue::Float(f(0)),
        MaterialPropertyValueType::Float2 => MaterialPropertyValue::Float2([f(0), f(1)]),
        MaterialPropertyValueType::Float3 => MaterialPropertyValue::Float3([f(0), f(1), f(2)]),
        MaterialPropertyValueType::Float4 => {
            MaterialPropertyValue::Float4([f(0), f(1), f(2), f(3)])
        }
        MaterialPropertyValueType::FillMode => MaterialPropertyValue::FillMode(
            FillMode::from_u32(u(0)).ok_or_else(|| corrupt("unknown fill mode"))?,
        ),
        MaterialPropertyValueType::CullMode => MaterialPropertyValue::CullMode(
            CullMode::from_u32(u(0)).ok_or_else(|| corrupt("unknown cull mode"))?,
        ),
        MaterialPropertyValueType::ConservativeRasterizationMode => {
            MaterialPropertyValue::ConservativeRasterizationMode(
                ConservativeRasterizationMode::from_u32(u(0))
                    .ok_or_else(|| corrupt("unknown conservative rasterization mode"))?,
            )
        }
        MaterialPropertyValueType::DepthWriteMask => MaterialPropertyValue::DepthWriteMask(
            DepthWriteMask::from_u32(u(0)).ok_or_else(|| corrupt("unknown depth write mask"))?,
        ),
        MaterialPropertyValueType::StencilOp => MaterialPropertyValue::StencilOp(
            StencilOp::from_u32(u(0)).ok_or_else(|| corrupt("unknown stencil op"))?,
        ),
        MaterialPropertyValueType::ComparisonFunc => MaterialPropertyValue::ComparisonFunc(
            ComparisonFunc::from_u32(u(0)).ok_or_else(|| corrupt("unknown comparison func"))?,
        ),
        MaterialPropertyValueType::Blend => MaterialPropertyValue::Blend(
            Blend::from_u32(u(0)).ok_or_else(|| corrupt("unknown blend factor"))?,
        ),
        MaterialPropertyValueType::BlendOp => MaterialPropertyValue::BlendOp(
            BlendOp::from_u32(u(0)).ok_or_else(|| corrupt("unknown blend op"))?,
        ),
        MaterialPropertyValueType::FilterMode => MaterialPropertyValue::FilterMode(
            FilterMode::from_u32(u(0)).ok_or_else(|| corrupt("unknown filter mode"))?,
        ),
        MaterialPropertyValueType::TextureAddressMode => MaterialPropertyValue::TextureAddressMode(
            TextureAddressMode::from_u32(u(0))
                .ok_or_else(|| corrupt("unknown texture address mode"))?,
        ),
        MaterialPropertyValueType::AssetId => MaterialPropertyValue::AssetId(AssetId(u(0))),
    };
    Ok(value)
}

fn encode_property_value(value: &MaterialPropertyValue) -> [u8; 16] {
    let mut blob = [0u8; 16];
    let put_u32 = |index: usize, raw: u32, blob: &mut [u8; 16]| {
        blob[index * 4..index * 4 + 4].copy_from_slice(&raw.to_le_bytes());
    };
    match value {
        MaterialPropertyValue::Boolean(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::Integer(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::Integer2(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, *component as u32, &mut blob);
            }
        }
        MaterialPropertyValue::Integer3(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, *component as u32, &mut blob);
            }
        }
        MaterialPropertyValue::Integer4(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, *component as u32, &mut blob);
            }
        }
        MaterialPropertyValue::Float(v) => put_u32(0, v.to_bits(), &mut blob),
        MaterialPropertyValue::Float2(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, component.to_bits(), &mut blob);
            }
        }
        MaterialPropertyValue::Float3(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, component.to_bits(), &mut blob);
            }
        }
        MaterialPropertyValue::Float4(v) => {
            for (index, component) in v.iter().enumerate() {
                put_u32(index, component.to_bits(), &mut blob);
            }
        }
        MaterialPropertyValue::FillMode(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::CullMode(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::ConservativeRasterizationMode(v) => {
            put_u32(0, *v as u32, &mut blob)
        }
        MaterialPropertyValue::DepthWriteMask(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::StencilOp(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::ComparisonFunc(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::Blend(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::BlendOp(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::FilterMode(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::TextureAddressMode(v) => put_u32(0, *v as u32, &mut blob),
        MaterialPropertyValue::AssetId(v) => put_u32(0, v.0, &mut blob),
    }
    blob
}

pub(crate) fn read_material_property(
    reader: &mut impl Read,
) -> Result<MaterialProperty, AssetLoadError> {
    let property_id = MaterialPropertyId(reader.read_u32::<LittleEndian>()?);
    let usage: MaterialPropertyUsage = read_enum(reader, "material property usage")?;
    let value_type: MaterialPropertyValueType = read_enum(reader, "material property value type")?;
    let mut blob = [0u8; 16];
    reader.read_exact(&mut blob)?;
    Ok(MaterialProperty::new(
        property_id,
        usage,
        decode_property_value(value_type, &blob)?,
    ))
}

pub(crate) fn write_material_property(
    writer: &mut impl Write,
    property: &MaterialProperty,
) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(property.property_id.0)?;
    writer.write_u32::<LittleEndian>(property.usage as u32)?;
    writer.write_u32::<LittleEndian>(property.value.value_type() as u32)?;
    writer.write_all(&encode_property_value(&property.value))?;
    Ok(())
}

fn read_shader_property_table(
    reader: &mut impl Read,
    count: u32,
) -> Result<ShaderProperties, AssetLoadError> {
    let mut table = ShaderProperties::new();
    for _ in 0..count {
        let property_id = MaterialPropertyId(reader.read_u32::<LittleEndian>()?);
        let value = reader.read_i32::<LittleEndian>()?;
        table.set(property_id, value);
    }
    Ok(table)
}

fn write_shader_property_table(
    writer: &mut impl Write,
    table: &ShaderProperties,
) -> Result<(), AssetLoadError> {
    for property in table.as_slice() {
        writer.write_u32::<LittleEndian>(property.property_id.0)?;
        writer.write_i32::<LittleEndian>(property.value)?;
    }
    Ok(())
}

// ---- sampler-state records -----------------------------------------------

fn read_sampler_state_descriptor(
    reader: &mut impl Read,
) -> Result<SamplerStateDescriptor, AssetLoadError> {
    Ok(SamplerStateDescriptor {
        filter: read_enum(reader, "filter mode")?,
        address_u: read_enum(reader, "texture address mode")?,
        address_v: read_enum(reader, "texture address mode")?,
        address_w: read_enum(reader, "texture address mode")?,
        mip_lod_bias: reader.read_f32::<LittleEndian>()?,
        max_anisotropy: reader.read_u32::<LittleEndian>()?,
        comparison_func: read_enum(reader, "comparison func")?,
        border_color: [
            reader.read_f32::<LittleEndian>()?,
            reader.read_f32::<LittleEndian>()?,
            reader.read_f32::<LittleEndian>()?,
            reader.read_f32::<LittleEndian>()?,
        ],
        min_lod: reader.read_f32::<LittleEndian>()?,
        max_lod: reader.read_f32::<LittleEndian>()?,
    })
}

fn write_sampler_state_descriptor(
    writer: &mut impl Write,
    sampler: &SamplerStateDescriptor,
) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(sampler.filter as u32)?;
    writer.write_u32::<LittleEndian>(sampler.address_u as u32)?;
    writer.write_u32::<LittleEndian>(sampler.address_v as u32)?;
    writer.write_u32::<LittleEndian>(sampler.address_w as u32)?;
    writer.write_f32::<LittleEndian>(sampler.mip_lod_bias)?;
    writer.write_u32::<LittleEndian>(sampler.max_anisotropy)?;
    writer.write_u32::<LittleEndian>(sampler.comparison_func as u32)?;
    for component in sampler.border_color {
        writer.write_f32::<LittleEndian>(component)?;
    }
    writer.write_f32::<LittleEndian>(sampler.min_lod)?;
    writer.write_f32::<LittleEndian>(sampler.max_lod)?;
    Ok(())
}

// ---- root-signature block ------------------------------------------------

const ROOT_PARAMETER_DESCRIPTOR_TABLE: u32 = 0;
const ROOT_PARAMETER_CONSTANTS_32BIT: u32 = 1;
const ROOT_PARAMETER_CBV: u32 = 2;
const ROOT_PARAMETER_SRV: u32 = 3;
const ROOT_PARAMETER_UAV: u32 = 4;

fn read_root_signature(reader: &mut impl Read) -> Result<RootSignatureDescriptor, AssetLoadError> {
    let number_of_root_parameters = reader.read_u32::<LittleEndian>()?;
    let number_of_descriptor_ranges = reader.read_u32::<LittleEndian>()?;
    let number_of_static_samplers = reader.read_u32::<LittleEndian>()?;
    let flags = RootSignatureFlags::from_bits_retain(reader.read_u32::<LittleEndian>()?);

    // Fixed-size parameter records first, then the flat range array the
    // descriptor tables index into in declaration order.
    struct RawParameter {
        parameter_type: u32,
        shader_visibility: ShaderVisibility,
        a: u32,
        b: u32,
        c: u32,
    }
    let mut raw_parameters = Vec::with_capacity(number_of_root_parameters as usize);
    for _ in 0..number_of_root_parameters {
        raw_parameters.push(RawParameter {
            parameter_type: reader.read_u32::<LittleEndian>()?,
            shader_visibility: read_enum(reader, "shader visibility")?,
            a: reader.read_u32::<LittleEndian>()?,
            b: reader.read_u32::<LittleEndian>()?,
            c: reader.read_u32::<LittleEndian>()?,
        });
    }

    let mut descriptor_ranges = Vec::with_capacity(number_of_descriptor_ranges as usize);
    for _ in 0..number_of_descriptor_ranges {
        let range_type: DescriptorRangeType = read_enum(reader, "descriptor range type")?;
        let number_of_descriptors = reader.read_u32::<LittleEndian>()?;
        let base_shader_register = reader.read_u32::<LittleEndian>()?;
        let register_space = reader.read_u32::<LittleEndian>()?;
        let offset_in_descriptors_from_table_start = reader.read_u32::<LittleEndian>()?;
        let sampler_root_parameter_index = reader.read_u32::<LittleEndian>()?;
        let base_shader_register_name = read_fixed_string(reader)?;
        descriptor_ranges.push(DescriptorRange {
            range_type,
            number_of_descriptors,
            base_shader_register,
            register_space,
            offset_in_descriptors_from_table_start,
            base_shader_register_name,
            sampler_root_parameter_index,
        });
    }

    let mut next_range = 0usize;
    let mut parameters = Vec::with_capacity(raw_parameters.len());
    for raw in &raw_parameters {
        let parameter = match raw.parameter_type {
            ROOT_PARAMETER_DESCRIPTOR_TABLE => {
                let count = raw.a as usize;
                if next_range + count > descriptor_ranges.len() {
                    return Err(corrupt(
                        "descriptor table references more ranges than the file carries",
                    ));
                }
                let ranges = descriptor_ranges[next_range..next_range + count].to_vec();
                next_range += count;
                RootParameter::DescriptorTable {
                    descriptor_ranges: ranges,
                    shader_visibility: raw.shader_visibility,
                }
            }
            ROOT_PARAMETER_CONSTANTS_32BIT => RootParameter::Constants32Bit {
                number_of_32bit_values: raw.a,
                shader_register: raw.b,
                register_space: raw.c,
                shader_visibility: raw.shader_visibility,
            },
            ROOT_PARAMETER_CBV => RootParameter::ConstantBufferView {
                shader_register: raw.a,
                register_space: raw.b,
                shader_visibility: raw.shader_visibility,
            },
            ROOT_PARAMETER_SRV => RootParameter::ShaderResourceView {
                shader_register: raw.a,
                register_space: raw.b,
                shader_visibility: raw.shader_visibility,
            },
            ROOT_PARAMETER_UAV => RootParameter::UnorderedAccessView {
                shader_register: raw.a,
                register_space: raw.b,
                shader_visibility: raw.shader_visibility,
            },
            other => return Err(corrupt(format!("unknown root parameter type {other}"))),
        };
        parameters.push(parameter);
    }

    let mut static_samplers = Vec::with_capacity(number_of_static_samplers as usize);
    for _ in 0..number_of_static_samplers {
        let sampler = read_sampler_state_descriptor(reader)?;
        let shader_register = reader.read_u32::<LittleEndian>()?;
        let register_space = reader.read_u32::<LittleEndian>()?;
        let shader_visibility = read_enum(reader, "shader visibility")?;
        static_samplers.push(StaticSampler {
            filter: sampler.filter,
            address_u: sampler.address_u,
            address_v: sampler.address_v,
            address_w: sampler.address_w,
            mip_lod_bias: sampler.mip_lod_bias,
            max_anisotropy: sampler.max_anisotropy,
            comparison_func: sampler.comparison_func,
            border_color: sampler.border_color,
            min_lod: sampler.min_lod,
            max_lod: sampler.max_lod,
            shader_register,
            register_space,
            shader_visibility,
        });
    }

    Ok(RootSignatureDescriptor {
        parameters,
        static_samplers,
        flags,
    })
}

fn write_root_signature(
    writer: &mut impl Write,
    root_signature: &RootSignatureDescriptor,
) -> Result<(), AssetLoadError> {
    let number_of_descriptor_ranges: usize = root_signature
        .parameters
        .iter()
        .map(|parameter| parameter.descriptor_ranges().len())
        .sum();
    writer.write_u32::<LittleEndian>(root_signature.parameters.len() as u32)?;
    writer.write_u32::<LittleEndian>(number_of_descriptor_ranges as u32)?;
    writer.write_u32::<LittleEndian>(root_signature.static_samplers.len() as u32)?;
    writer.write_u32::<LittleEndian>(root_signature.flags.bits())?;

    for parameter in &root_signature.parameters {
        let (parameter_type, a, b, c) = match parameter {
            RootParameter::DescriptorTable {
                descriptor_ranges, ..
            } => (
                ROOT_PARAMETER_DESCRIPTOR_TABLE,
                descriptor_ranges.len() as u32,
                0,
                0,
            ),
            RootParameter::Constants32Bit {
                number_of_32bit_values,
                shader_register,
                register_space,
                ..
            } => (
                ROOT_PARAMETER_CONSTANTS_32BIT,
                *number_of_32bit_values,
                *shader_register,
                *register_space,
            ),
            RootParameter::ConstantBufferView {
                shader_register,
                register_space,
                ..
            } => (ROOT_PARAMETER_CBV, *shader_register, *register_space, 0),
            RootParameter::ShaderResourceView {
                shader_register,
                register_space,
                ..
            } => (ROOT_PARAMETER_SRV, *shader_register, *register_space, 0),
            RootParameter::UnorderedAccessView {
                shader_register,
                register_space,
                ..
            } => (ROOT_PARAMETER_UAV, *shader_register, *register_space, 0),
        };
        writer.write_u32::<LittleEndian>(parameter_type)?;
        writer.write_u32::<LittleEndian>(parameter.shader_visibility() as u32)?;
        writer.write_u32::<LittleEndian>(a)?;
        writer.write_u32::<LittleEndian>(b)?;
        writer.write_u32::<LittleEndian>(c)?;
    }

    for parameter in &root_signature.parameters {
        for range in parameter.descriptor_ranges() {
            writer.write_u32::<LittleEndian>(range.range_type as u32)?;
            writer.write_u32::<LittleEndian>(range.number_of_descriptors)?;
            writer.write_u32::<LittleEndian>(range.base_shader_register)?;
            writer.write_u32::<LittleEndian>(range.register_space)?;
            writer.write_u32::<LittleEndian>(range.offset_in_descriptors_from_table_start)?;
            writer.write_u32::<LittleEndian>(range.sampler_root_parameter_index)?;
            write_fixed_string(writer, &range.base_shader_register_name)?;
        }
    }

    for static_sampler in &root_signature.static_samplers {
        write_sampler_state_descriptor(
            writer,
            &SamplerStateDescriptor {
                filter: static_sampler.filter,
                address_u: static_sampler.address_u,
                address_v: static_sampler.address_v,
                address_w: static_sampler.address_w,
                mip_lod_bias: static_sampler.mip_lod_bias,
                max_anisotropy: static_sampler.max_anisotropy,
                comparison_func: static_sampler.comparison_func,
                border_color: static_sampler.border_color,
                min_lod: static_sampler.min_lod,
                max_lod: static_sampler.max_lod,
            },
        )?;
        writer.write_u32::<LittleEndian>(static_sampler.shader_register)?;
        writer.write_u32::<LittleEndian>(static_sampler.register_space)?;
        writer.write_u32::<LittleEndian>(static_sampler.shader_visibility as u32)?;
    }
    Ok(())
}

// ---- pipeline-state block ------------------------------------------------

fn read_rasterizer_state(reader: &mut impl Read) -> Result<RasterizerState, AssetLoadError> {
    Ok(RasterizerState {
        fill_mode: read_enum(reader, "fill mode")?,
        cull_mode: read_enum(reader, "cull mode")?,
        front_counter_clockwise: read_bool(reader)?,
        depth_bias: reader.read_i32::<LittleEndian>()?,
        depth_bias_clamp: reader.read_f32::<LittleEndian>()?,
        slope_scaled_depth_bias: reader.read_f32::<LittleEndian>()?,
        depth_clip_enable: read_bool(reader)?,
        multisample_enable: read_bool(reader)?,
        antialiased_line_enable: read_bool(reader)?,
        forced_sample_count: reader.read_u32::<LittleEndian>()?,
        conservative_rasterization_mode: read_enum(reader, "conservative rasterization mode")?,
        scissor_enable: read_bool(reader)?,
    })
}

fn write_rasterizer_state(
    writer: &mut impl Write,
    state: &RasterizerState,
) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(state.fill_mode as u32)?;
    writer.write_u32::<LittleEndian>(state.cull_mode as u32)?;
    write_bool(writer, state.front_counter_clockwise)?;
    writer.write_i32::<LittleEndian>(state.depth_bias)?;
    writer.write_f32::<LittleEndian>(state.depth_bias_clamp)?;
    writer.write_f32::<LittleEndian>(state.slope_scaled_depth_bias)?;
    write_bool(writer, state.depth_clip_enable)?;
    write_bool(writer, state.multisample_enable)?;
    write_bool(writer, state.antialiased_line_enable)?;
    writer.write_u32::<LittleEndian>(state.forced_sample_count)?;
    writer.write_u32::<LittleEndian>(state.conservative_rasterization_mode as u32)?;
    write_bool(writer, state.scissor_enable)?;
    Ok(())
}

fn read_stencil_op_desc(reader: &mut impl Read) -> Result<StencilOpDesc, AssetLoadError> {
    Ok(StencilOpDesc {
        stencil_fail_op: read_enum(reader, "stencil op")?,
        stencil_depth_fail_op: read_enum(reader, "stencil op")?,
        stencil_pass_op: read_enum(reader, "stencil op")?,
        stencil_func: read_enum(reader, "comparison func")?,
    })
}

fn write_stencil_op_desc(
    writer: &mut impl Write,
    desc: &StencilOpDesc,
) -> Result<(), AssetLoadError> {
    writer.write_u32::<LittleEndian>(desc.stencil_fail_op as u32)?;
    writer.write_u32::<LittleEndian>(desc.stencil_depth_fail_op as u32)?;
    writer.write_u32::<LittleEndian>(desc.stencil_pass_op as u32)?;
    writer.write_u32::<LittleEndian>(desc.stencil_func as u32)?;
    Ok(())
}

fn read_depth_stencil_state(reader: &mut impl Read) -> Result<DepthStencilState, AssetLoadError> {
    Ok(DepthStencilState {
        depth_enable: read_bool(reader)?,
        depth_write_mask: read_enum(reader, "depth write mask")?,
        depth_func: read_enum(reader, "comparison func")?,
        stencil_enable: read_bool(reader)?,
        stencil_read_mask: reader.read_u32::<LittleEndian>()? as u8,
        stencil_write_mask: reader.read_u32::<LittleEndian>()? as u8,
        front_face: read_stencil_op_desc(reader)?,
        back_face: read_stencil_op_desc(reader)?,
    })
}

fn write_depth_stencil_state(
    writer: &mut impl Write,
    state: &DepthStencilState,
) -> Result<(), AssetLoadError> {
    write_bool(writer, state.depth_enable)?;
    writer.write_u32::<LittleEndian>(state.depth_write_mask as u32)?;
    writer.write_u32::<LittleEndian>(state.depth_func as u32)?;
    write_bool(writer, state.stencil_enable)?;
    writer.write_u32::<LittleEndian>(state.stencil_read_mask as u32)?;
    writer.write_u32::<LittleEndian>(state.stencil_write_mask as u32)?;
    write_stencil_op_desc(writer, &state.front_face)?;
    write_stencil_op_desc(writer, &state.back_face)?;
    Ok(())
}

fn read_blend_state(reader: &mut impl Read) -> Result<BlendState, AssetLoadError> {
    let alpha_to_coverage_enable = read_bool(reader)?;
    let independent_blend_enable = read_bool(reader)?;
    let mut render_targets = [RenderTargetBlendDesc::default(); MAXIMUM_NUMBER_OF_RENDER_TARGETS];
    for render_target in &mut render_targets {
        *render_target = RenderTargetBlendDesc {
            blend_enable: read_bool(reader)?,
            src_blend: read_enum(reader, "blend factor")?,
            dest_blend: read_enum(reader, "blend factor")?,
            blend_op: read_enum(reader, "blend op")?,
            src_blend_alpha: read_enum(reader, "blend factor")?,
            dest_blend_alpha: read_enum(reader, "blend factor")?,
            blend_op_alpha: read_enum(reader, "blend op")?,
            render_target_write_mask: render_types::pipeline_state::ColorWriteMask::from_bits_retain(
                reader.read_u32::<LittleEndian>()? as u8,
            ),
        };
    }
    Ok(BlendState {
        alpha_to_coverage_enable,
        independent_blend_enable,
        render_targets,
    })
}

fn write_blend_state(writer: &mut impl Write, state: &BlendState) -> Result<(), AssetLoadError> {
    write_bool(writer, state.alpha_to_coverage_enable)?;
    write_bool(writer, state.independent_blend_enable)?;
    for render_target in &state.render_targets {
        write_bool(writer, render_target.blend_enable)?;
        writer.write_u32::<LittleEndian>(render_target.src_blend as u32)?;
        writer.write_u32::<LittleEndian>(render_target.dest_blend as u32)?;
        writer.write_u32::<LittleEndian>(render_target.blend_op as u32)?;
        writer.write_u32::<LittleEndian>(render_target.src_blend_alpha as u32)?;
        writer.write_u32::<LittleEndian>(render_target.dest_blend_alpha as u32)?;
        writer.write_u32::<LittleEndian>(render_target.blend_op_alpha as u32)?;
        writer.write_u32::<LittleEndian>(render_target.render_target_write_mask.bits() as u32)?;
    }
    Ok(())
}

// ---- whole file ----------------------------------------------------------

/// Loads a material blueprint. Shader-blueprint and default-texture
/// references are translated through the package id table; the
/// shader-combination cap is enforced here, at load time.
pub fn load_material_blueprint(
    reader: &mut impl Read,
    asset_id: AssetId,
    asset_ids: &AssetIdMapping,
    allow_crazy_number_of_shader_combinations: bool,
) -> Result<MaterialBlueprint, AssetLoadError> {
    read_and_check_header(
        reader,
        MATERIAL_BLUEPRINT_FORMAT_TYPE,
        MATERIAL_BLUEPRINT_FORMAT_VERSION,
    )?;
    let number_of_properties = reader.read_u32::<LittleEndian>()?;
    let number_of_shader_combination_properties = reader.read_u32::<LittleEndian>()?;
    let number_of_integer_shader_combination_properties = reader.read_u32::<LittleEndian>()?;
    let number_of_uniform_buffers = reader.read_u32::<LittleEndian>()?;
    let number_of_texture_buffers = reader.read_u32::<LittleEndian>()?;
    let number_of_sampler_states = reader.read_u32::<LittleEndian>()?;
    let number_of_textures = reader.read_u32::<LittleEndian>()?;

    let mut blueprint = MaterialBlueprint::new(asset_id);
    blueprint.allow_crazy_number_of_shader_combinations =
        allow_crazy_number_of_shader_combinations;

    let mut properties = Vec::with_capacity(number_of_properties as usize);
    for _ in 0..number_of_properties {
        properties.push(read_material_property(reader)?);
    }
    // The compiler writes the schema sorted; a violation is a corrupt asset.
    blueprint.schema = MaterialProperties::from_sorted(properties)
        .map_err(|_| corrupt("blueprint property vector is not strictly sorted"))?;

    blueprint.visual_importance =
        read_shader_property_table(reader, number_of_shader_combination_properties)?;
    blueprint.maximum_integer_values =
        read_shader_property_table(reader, number_of_integer_shader_combination_properties)?;

    blueprint.root_signature = read_root_signature(reader)?;

    blueprint.shader_stages = ShaderStageAssets {
        vertex: asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?)),
        tessellation_control: asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?)),
        tessellation_evaluation: asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?)),
        geometry: asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?)),
        fragment: asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?)),
    };

    let topology: PrimitiveTopology = read_enum(reader, "primitive topology")?;
    let number_of_vertex_attributes = reader.read_u32::<LittleEndian>()?;
    let mut vertex_attributes = Vec::with_capacity(number_of_vertex_attributes as usize);
    for _ in 0..number_of_vertex_attributes {
        vertex_attributes.push(read_vertex_attribute(reader)?);
    }
    blueprint.pipeline_state.primitive_topology = topology;
    blueprint.pipeline_state.vertex_attributes = vertex_attributes;
    blueprint.pipeline_state.rasterizer_state = read_rasterizer_state(reader)?;
    blueprint.pipeline_state.depth_stencil_state = read_depth_stencil_state(reader)?;
    blueprint.pipeline_state.blend_state = read_blend_state(reader)?;

    for _ in 0..number_of_uniform_buffers {
        let root_parameter_index = reader.read_u32::<LittleEndian>()?;
        let usage: BufferUsageSemantic = read_enum(reader, "uniform buffer usage")?;
        let number_of_elements = reader.read_u32::<LittleEndian>()?;
        let number_of_bytes_per_element = reader.read_u32::<LittleEndian>()?;
        let number_of_element_properties = reader.read_u32::<LittleEndian>()?;
        let mut element_properties = Vec::with_capacity(number_of_element_properties as usize);
        for _ in 0..number_of_element_properties {
            element_properties.push(read_material_property(reader)?);
        }
        blueprint.uniform_buffers.push(UniformBufferDefinition {
            root_parameter_index,
            usage,
            number_of_elements,
            number_of_bytes_per_element,
            element_properties,
        });
    }

    for _ in 0..number_of_texture_buffers {
        let root_parameter_index = reader.read_u32::<LittleEndian>()?;
        let usage: BufferUsageSemantic = read_enum(reader, "texture buffer usage")?;
        let number_of_elements = reader.read_u32::<LittleEndian>()?;
        let number_of_bytes_per_element = reader.read_u32::<LittleEndian>()?;
        let number_of_element_properties = reader.read_u32::<LittleEndian>()?;
        let mut element_properties = Vec::with_capacity(number_of_element_properties as usize);
        for _ in 0..number_of_element_properties {
            element_properties.push(read_material_property(reader)?);
        }
        blueprint.texture_buffers.push(TextureBufferDefinition {
            root_parameter_index,
            usage,
            number_of_elements,
            number_of_bytes_per_element,
            element_properties,
        });
    }

    for _ in 0..number_of_sampler_states {
        let root_parameter_index = reader.read_u32::<LittleEndian>()?;
        let sampler_state = read_sampler_state_descriptor(reader)?;
        blueprint.sampler_states.push(SamplerStateDefinition {
            root_parameter_index,
            sampler_state,
        });
    }

    for _ in 0..number_of_textures {
        let root_parameter_index = reader.read_u32::<LittleEndian>()?;
        let default_texture_asset_id =
            asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?));
        let property_raw = reader.read_u32::<LittleEndian>()?;
        let material_property_id = if property_raw == UNINITIALIZED_ID {
            None
        } else {
            Some(MaterialPropertyId(property_raw))
        };
        blueprint.textures.push(TextureDefinition {
            root_parameter_index,
            default_texture_asset_id,
            material_property_id,
        });
    }

    blueprint.validate()?;
    Ok(blueprint)
}

/// Compiler-side counterpart of [`load_material_blueprint`].
pub fn write_material_blueprint(
    writer: &mut impl Write,
    blueprint: &MaterialBlueprint,
) -> Result<(), AssetLoadError> {
    write_header(
        writer,
        MATERIAL_BLUEPRINT_FORMAT_TYPE,
        MATERIAL_BLUEPRINT_FORMAT_VERSION,
    )?;
    writer.write_u32::<LittleEndian>(blueprint.schema.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.visual_importance.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.maximum_integer_values.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.uniform_buffers.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.texture_buffers.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.sampler_states.len() as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.textures.len() as u32)?;

    for property in &blueprint.schema {
        write_material_property(writer, property)?;
    }
    write_shader_property_table(writer, &blueprint.visual_importance)?;
    write_shader_property_table(writer, &blueprint.maximum_integer_values)?;
    write_root_signature(writer, &blueprint.root_signature)?;

    for stage in [
        blueprint.shader_stages.vertex,
        blueprint.shader_stages.tessellation_control,
        blueprint.shader_stages.tessellation_evaluation,
        blueprint.shader_stages.geometry,
        blueprint.shader_stages.fragment,
    ] {
        writer.write_u32::<LittleEndian>(stage.0)?;
    }

    writer.write_u32::<LittleEndian>(blueprint.pipeline_state.primitive_topology as u32)?;
    writer.write_u32::<LittleEndian>(blueprint.pipeline_state.vertex_attributes.len() as u32)?;
    for attribute in &blueprint.pipeline_state.vertex_attributes {
        write_vertex_attribute(writer, attribute)?;
    }
    write_rasterizer_state(writer, &blueprint.pipeline_state.rasterizer_state)?;
    write_depth_stencil_state(writer, &blueprint.pipeline_state.depth_stencil_state)?;
    write_blend_state(writer, &blueprint.pipeline_state.blend_state)?;

    for uniform_buffer in &blueprint.uniform_buffers {
        writer.write_u32::<LittleEndian>(uniform_buffer.root_parameter_index)?;
        writer.write_u32::<LittleEndian>(uniform_buffer.usage as u32)?;
        writer.write_u32::<LittleEndian>(uniform_buffer.number_of_elements)?;
        writer.write_u32::<LittleEndian>(uniform_buffer.number_of_bytes_per_element)?;
        writer.write_u32::<LittleEndian>(uniform_buffer.element_properties.len() as u32)?;
        for property in &uniform_buffer.element_properties {
            write_material_property(writer, property)?;
        }
    }

    for texture_buffer in &blueprint.texture_buffers {
        writer.write_u32::<LittleEndian>(texture_buffer.root_parameter_index)?;
        writer.write_u32::<LittleEndian>(texture_buffer.usage as u32)?;
        writer.write_u32::<LittleEndian>(texture_buffer.number_of_elements)?;
        writer.write_u32::<LittleEndian>(texture_buffer.number_of_bytes_per_element)?;
        writer.write_u32::<LittleEndian>(texture_buffer.element_properties.len() as u32)?;
        for property in &texture_buffer.element_properties {
            write_material_property(writer, property)?;
        }
    }

    for sampler in &blueprint.sampler_states {
        writer.write_u32::<LittleEndian>(sampler.root_parameter_index)?;
        write_sampler_state_descriptor(writer, &sampler.sampler_state)?;
    }

    for texture in &blueprint.textures {
        writer.write_u32::<LittleEndian>(texture.root_parameter_index)?;
        writer.write_u32::<LittleEndian>(texture.default_texture_asset_id.0)?;
        writer.write_u32::<LittleEndian>(
            texture
                .material_property_id
                .map(|id| id.0)
                .unwrap_or(UNINITIALIZED_ID),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use material::property::MaterialPropertyUsage;
    use material::MaterialError;
    use render_types::root_signature::NO_SAMPLER_ROOT_PARAMETER;

    use super::*;

    fn property(name: &str, usage: MaterialPropertyUsage, value: MaterialPropertyValue) -> MaterialProperty {
        MaterialProperty::new(MaterialPropertyId::from_name(name), usage, value)
    }

    fn blueprint_with_combination_properties(count: usize) -> MaterialBlueprint {
        let mut blueprint = MaterialBlueprint::new(AssetId::from_name("Blueprint"));
        let mut properties = Vec::new();
        for index in 0..count {
            let name = format!("Combination{index}");
            properties.push(property(
                &name,
                MaterialPropertyUsage::ShaderCombination,
                MaterialPropertyValue::Integer(1),
            ));
            blueprint
                .visual_importance
                .set(MaterialPropertyId::from_name(&name), 10 * (index as i32 + 1));
            blueprint
                .maximum_integer_values
                .set(MaterialPropertyId::from_name(&name), 2);
        }
        blueprint.schema = MaterialProperties::from_unsorted(properties).unwrap();
        blueprint
    }

    #[test]
    fn round_trip_reproduces_the_combination_tables() {
        let mut blueprint = blueprint_with_combination_properties(3);
        blueprint.root_signature = RootSignatureDescriptor {
            parameters: vec![
                RootParameter::ConstantBufferView {
                    shader_register: 0,
                    register_space: 0,
                    shader_visibility: ShaderVisibility::All,
                },
                RootParameter::DescriptorTable {
                    descriptor_ranges: vec![DescriptorRange {
                        range_type: DescriptorRangeType::Srv,
                        number_of_descriptors: 1,
                        base_shader_register: 0,
                        register_space: 0,
                        offset_in_descriptors_from_table_start: 0,
                        base_shader_register_name: "AlbedoMap".into(),
                        sampler_root_parameter_index: NO_SAMPLER_ROOT_PARAMETER,
                    }],
                    shader_visibility: ShaderVisibility::Fragment,
                },
            ],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };
        blueprint.shader_stages.vertex = AssetId::from_name("ForwardVertex");
        blueprint.shader_stages.fragment = AssetId::from_name("ForwardFragment");

        let mut bytes = Vec::new();
        write_material_blueprint(&mut bytes, &blueprint).unwrap();
        let loaded = load_material_blueprint(
            &mut bytes.as_slice(),
            AssetId::from_name("Blueprint"),
            &AssetIdMapping::new(),
            false,
        )
        .unwrap();

        assert_eq!(loaded.visual_importance, blueprint.visual_importance);
        assert_eq!(loaded.maximum_integer_values, blueprint.maximum_integer_values);
        assert_eq!(loaded.schema, blueprint.schema);
        assert_eq!(loaded.root_signature, blueprint.root_signature);
        assert_eq!(loaded.shader_stages, blueprint.shader_stages);
        assert_eq!(loaded.pipeline_state, blueprint.pipeline_state);
    }

    #[test]
    fn sampler_and_texture_sections_load_with_their_counts() {
        let mut blueprint = blueprint_with_combination_properties(3);
        blueprint.sampler_states.push(SamplerStateDefinition {
            root_parameter_index: 1,
            sampler_state: SamplerStateDescriptor::default(),
        });
        blueprint.textures.push(TextureDefinition {
            root_parameter_index: 2,
            default_texture_asset_id: AssetId::from_name("DefaultWhite"),
            material_property_id: Some(MaterialPropertyId::from_name("AlbedoMap")),
        });

        let mut bytes = Vec::new();
        write_material_blueprint(&mut bytes, &blueprint).unwrap();
        let loaded = load_material_blueprint(
            &mut bytes.as_slice(),
            blueprint.asset_id,
            &AssetIdMapping::new(),
            false,
        )
        .unwrap();
        assert_eq!(loaded.sampler_states.len(), 1);
        assert_eq!(loaded.textures.len(), 1);
        assert_eq!(loaded.schema.len(), 3);
        assert_eq!(loaded.uniform_buffers.len(), 0);
    }

    #[test]
    fn five_combination_properties_without_opt_in_fail_the_load() {
        let blueprint = blueprint_with_combination_properties(5);
        let mut bytes = Vec::new();
        write_material_blueprint(&mut bytes, &blueprint).unwrap();
        let error = load_material_blueprint(
            &mut bytes.as_slice(),
            blueprint.asset_id,
            &AssetIdMapping::new(),
            false,
        )
        .unwrap_err();
        match error {
            AssetLoadError::Material(MaterialError::TooManyShaderCombinationProperties {
                count,
                maximum,
            }) => {
                assert_eq!(count, 5);
                assert_eq!(maximum, 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // The explicit opt-in lifts the cap.
        assert!(load_material_blueprint(
            &mut bytes.as_slice(),
            blueprint.asset_id,
            &AssetIdMapping::new(),
            true,
        )
        .is_ok());
    }

    #[test]
    fn version_mismatch_is_an_unsupported_format() {
        let blueprint = blueprint_with_combination_properties(1);
        let mut bytes = Vec::new();
        write_material_blueprint(&mut bytes, &blueprint).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            load_material_blueprint(
                &mut bytes.as_slice(),
                blueprint.asset_id,
                &AssetIdMapping::new(),
                false,
            ),
            Err(AssetLoadError::UnsupportedFormat { found_version: 9, .. })
        ));
    }

    #[test]
    fn uniform_buffer_blocks_round_trip_with_element_properties() {
        let mut blueprint = blueprint_with_combination_properties(0);
        blueprint.uniform_buffers.push(UniformBufferDefinition {
            root_parameter_index: 0,
            usage: BufferUsageSemantic::Material,
            number_of_elements: 1,
            number_of_bytes_per_element: 32,
            element_properties: vec![
                property(
                    "AlbedoColor",
                    MaterialPropertyUsage::Static,
                    MaterialPropertyValue::Float4([1.0, 0.5, 0.25, 1.0]),
                ),
                property(
                    "Metalness",
                    MaterialPropertyUsage::Static,
                    MaterialPropertyValue::Float(0.125),
                ),
            ],
        });

        let mut bytes = Vec::new();
        write_material_blueprint(&mut bytes, &blueprint).unwrap();
        let loaded = load_material_blueprint(
            &mut bytes.as_slice(),
            blueprint.asset_id,
            &AssetIdMapping::new(),
            false,
        )
        .unwrap();
        assert_eq!(loaded.uniform_buffers, blueprint.uniform_buffers);
    }
}
