//! The shader-blueprint binary format: per-stage shader source code plus the
//! list of shader properties the source reacts to. At resolve time the
//! runtime prepends the combination defines derived from those properties;
//! the source text itself is backend shader-language input and opaque here.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use material::blueprint::MaterialBlueprint;
use material::property::{AssetId, MaterialPropertyId};
use material::shader_properties::ShaderProperties;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::header::{read_and_check_header, write_header};
use crate::AssetLoadError;

pub const SHADER_BLUEPRINT_FORMAT_TYPE: &[u8; 4] = b"SHB1";
pub const SHADER_BLUEPRINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum ShaderStage {
    Vertex = 0,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderBlueprintResource {
    pub asset_id: AssetId,
    pub stage: ShaderStage,
    pub source_code: String,
    /// Shader properties referenced by the source; informational for tools
    /// and validation, the combination key decides the actual defines.
    pub referenced_shader_properties: ShaderProperties,
}

pub fn load_shader_blueprint(
    reader: &mut impl Read,
    asset_id: AssetId,
) -> Result<ShaderBlueprintResource, AssetLoadError> {
    read_and_check_header(
        reader,
        SHADER_BLUEPRINT_FORMAT_TYPE,
        SHADER_BLUEPRINT_FORMAT_VERSION,
    )?;
    let stage_raw = reader.read_u32::<LittleEndian>()?;
    let stage = ShaderStage::from_u32(stage_raw)
        .ok_or_else(|| AssetLoadError::Corrupt(format!("unknown shader stage {stage_raw}")))?;
    let number_of_referenced_properties = reader.read_u32::<LittleEndian>()?;
    let source_length = reader.read_u32::<LittleEndian>()?;

    let mut referenced_shader_properties = ShaderProperties::new();
    for _ in 0..number_of_referenced_properties {
        let property_id = MaterialPropertyId(reader.read_u32::<LittleEndian>()?);
        let maximum_value = reader.read_i32::<LittleEndian>()?;
        referenced_shader_properties.set(property_id, maximum_value);
    }

    let mut source_bytes = vec![0u8; source_length as usize];
    reader.read_exact(&mut source_bytes)?;
    let source_code = String::from_utf8(source_bytes)
        .map_err(|_| AssetLoadError::Corrupt("shader source is not valid UTF-8".into()))?;

    Ok(ShaderBlueprintResource {
        asset_id,
        stage,
        source_code,
        referenced_shader_properties,
    })
}

pub fn write_shader_blueprint(
    writer: &mut impl Write,
    shader_blueprint: &ShaderBlueprintResource,
) -> Result<(), AssetLoadError> {
    write_header(
        writer,
        SHADER_BLUEPRINT_FORMAT_TYPE,
        SHADER_BLUEPRINT_FORMAT_VERSION,
    )?;
    writer.write_u32::<LittleEndian>(shader_blueprint.stage as u32)?;
    writer.write_u32::<LittleEndian>(
        shader_blueprint.referenced_shader_properties.len() as u32
    )?;
    writer.write_u32::<LittleEndian>(shader_blueprint.source_code.len() as u32)?;
    for property in shader_blueprint.referenced_shader_properties.as_slice() {
        writer.write_u32::<LittleEndian>(property.property_id.0)?;
        writer.write_i32::<LittleEndian>(property.value)?;
    }
    writer.write_all(shader_blueprint.source_code.as_bytes())?;
    Ok(())
}

/// Attaches a loaded shader blueprint to the material blueprint that
/// references it by asset id. Returns false when no stage of the material
/// blueprint references this shader.
pub fn attach_shader_blueprint(
    material_blueprint: &mut MaterialBlueprint,
    shader_blueprint: &ShaderBlueprintResource,
) -> bool {
    let stages = &material_blueprint.shader_stages;
    let (referenced, slot) = match shader_blueprint.stage {
        ShaderStage::Vertex => (
            stages.vertex,
            &mut material_blueprint.stage_sources.vertex_shader_source,
        ),
        ShaderStage::TessellationControl => (
            stages.tessellation_control,
            &mut material_blueprint.stage_sources.tess_control_shader_source,
        ),
        ShaderStage::TessellationEvaluation => (
            stages.tessellation_evaluation,
            &mut material_blueprint.stage_sources.tess_eval_shader_source,
        ),
        ShaderStage::Geometry => (
            stages.geometry,
            &mut material_blueprint.stage_sources.geometry_shader_source,
        ),
        ShaderStage::Fragment => (
            stages.fragment,
            &mut material_blueprint.stage_sources.fragment_shader_source,
        ),
    };
    if referenced != shader_blueprint.asset_id {
        return false;
    }
    *slot = Some(shader_blueprint.source_code.clone());
    true
}

#[cfg(test)]
mod tests {
    use material::property::MaterialPropertyId;

    use super::*;

    fn fragment_blueprint() -> ShaderBlueprintResource {
        let mut referenced = ShaderProperties::new();
        referenced.set(MaterialPropertyId::from_name("UseAlphaMap"), 1);
        ShaderBlueprintResource {
            asset_id: AssetId::from_name("ForwardFragment"),
            stage: ShaderStage::Fragment,
            source_code: "void main() { /* forward shading */ }".into(),
            referenced_shader_properties: referenced,
        }
    }

    #[test]
    fn shader_blueprint_round_trip() {
        let shader_blueprint = fragment_blueprint();
        let mut bytes = Vec::new();
        write_shader_blueprint(&mut bytes, &shader_blueprint).unwrap();
        assert_eq!(&bytes[0..4], b"SHB1");
        let loaded =
            load_shader_blueprint(&mut bytes.as_slice(), shader_blueprint.asset_id).unwrap();
        assert_eq!(loaded, shader_blueprint);
    }

    #[test]
    fn attach_fills_the_matching_stage_slot() {
        let shader_blueprint = fragment_blueprint();
        let mut material_blueprint =
            MaterialBlueprint::new(AssetId::from_name("ForwardBlueprint"));
        material_blueprint.shader_stages.fragment = AssetId::from_name("ForwardFragment");

        assert!(attach_shader_blueprint(&mut material_blueprint, &shader_blueprint));
        assert_eq!(
            material_blueprint.stage_sources.fragment_shader_source.as_deref(),
            Some("void main() { /* forward shading */ }")
        );
        // The vertex slot stays untouched.
        assert!(material_blueprint.stage_sources.vertex_shader_source.is_none());
    }

    #[test]
    fn attach_rejects_unreferenced_shaders() {
        let shader_blueprint = fragment_blueprint();
        let mut material_blueprint = MaterialBlueprint::new(AssetId::from_name("Other"));
        material_blueprint.shader_stages.fragment = AssetId::from_name("SomeOtherFragment");
        assert!(!attach_shader_blueprint(&mut material_blueprint, &shader_blueprint));
    }
}
