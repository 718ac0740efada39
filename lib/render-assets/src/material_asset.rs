//! The material binary format: ordered technique list plus property
//! overrides, loaded into a [`MaterialInstance`].

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use material::instance::{MaterialInstance, MaterialTechnique, MaterialTechniqueId};
use material::property::{AssetId, MaterialProperties};

use crate::asset_ids::AssetIdMapping;
use crate::header::{read_and_check_header, write_header};
use crate::material_blueprint::{read_material_property, write_material_property};
use crate::AssetLoadError;

pub const MATERIAL_FORMAT_TYPE: &[u8; 4] = b"MAT1";
pub const MATERIAL_FORMAT_VERSION: u32 = 1;

/// Loads a material, translating blueprint references through the package
/// id table.
pub fn load_material(
    reader: &mut impl Read,
    asset_id: AssetId,
    asset_ids: &AssetIdMapping,
) -> Result<MaterialInstance, AssetLoadError> {
    read_and_check_header(reader, MATERIAL_FORMAT_TYPE, MATERIAL_FORMAT_VERSION)?;
    let number_of_techniques = reader.read_u32::<LittleEndian>()?;
    let number_of_properties = reader.read_u32::<LittleEndian>()?;

    let mut instance = MaterialInstance::new(asset_id);
    for _ in 0..number_of_techniques {
        let material_technique_id = MaterialTechniqueId(reader.read_u32::<LittleEndian>()?);
        let material_blueprint_asset_id =
            asset_ids.translate(AssetId(reader.read_u32::<LittleEndian>()?));
        instance.techniques.push(MaterialTechnique {
            material_technique_id,
            material_blueprint_asset_id,
        });
    }

    let mut properties = Vec::with_capacity(number_of_properties as usize);
    for _ in 0..number_of_properties {
        properties.push(read_material_property(reader)?);
    }
    instance.properties = MaterialProperties::from_sorted(properties)
        .map_err(|_| AssetLoadError::Corrupt("material property vector is not strictly sorted".into()))?;
    Ok(instance)
}

/// Compiler-side counterpart of [`load_material`].
pub fn write_material(
    writer: &mut impl Write,
    instance: &MaterialInstance,
) -> Result<(), AssetLoadError> {
    write_header(writer, MATERIAL_FORMAT_TYPE, MATERIAL_FORMAT_VERSION)?;
    writer.write_u32::<LittleEndian>(instance.techniques.len() as u32)?;
    writer.write_u32::<LittleEndian>(instance.properties.len() as u32)?;
    for technique in &instance.techniques {
        writer.write_u32::<LittleEndian>(technique.material_technique_id.0)?;
        writer.write_u32::<LittleEndian>(technique.material_blueprint_asset_id.0)?;
    }
    for property in &instance.properties {
        write_material_property(writer, property)?;
    }
    Ok(())
}
