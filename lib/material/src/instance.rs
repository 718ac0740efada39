//! Material instances: an ordered technique list referring to blueprints,
//! plus the property overrides applied on top of the blueprint schema.

use crate::property::{fnv1a_32, AssetId, MaterialProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialTechniqueId(pub u32);

impl MaterialTechniqueId {
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_32(name))
    }
}

/// The conventional technique most materials carry.
pub const DEFAULT_TECHNIQUE_ID: MaterialTechniqueId = MaterialTechniqueId::from_name("Default");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialTechnique {
    pub material_technique_id: MaterialTechniqueId,
    pub material_blueprint_asset_id: AssetId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInstance {
    pub asset_id: AssetId,
    /// Ordered; the first technique is the fallback.
    pub techniques: Vec<MaterialTechnique>,
    pub properties: MaterialProperties,
}

impl MaterialInstance {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            techniques: Vec::new(),
            properties: MaterialProperties::new(),
        }
    }

    pub fn technique_by_id(&self, id: MaterialTechniqueId) -> Option<&MaterialTechnique> {
        self.techniques
            .iter()
            .find(|technique| technique.material_technique_id == id)
    }

    /// Technique selection with first-technique fallback when the requested
    /// id is absent.
    pub fn select_technique(&self, id: MaterialTechniqueId) -> Option<&MaterialTechnique> {
        self.technique_by_id(id).or_else(|| self.techniques.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technique_selection_falls_back_to_the_first() {
        let mut instance = MaterialInstance::new(AssetId::from_name("M"));
        instance.techniques = vec![
            MaterialTechnique {
                material_technique_id: DEFAULT_TECHNIQUE_ID,
                material_blueprint_asset_id: AssetId::from_name("ForwardBlueprint"),
            },
            MaterialTechnique {
                material_technique_id: MaterialTechniqueId::from_name("DepthOnly"),
                material_blueprint_asset_id: AssetId::from_name("DepthBlueprint"),
            },
        ];

        let shadow = MaterialTechniqueId::from_name("Shadow");
        assert_eq!(
            instance.select_technique(shadow).unwrap().material_blueprint_asset_id,
            AssetId::from_name("ForwardBlueprint")
        );
        assert_eq!(
            instance
                .select_technique(MaterialTechniqueId::from_name("DepthOnly"))
                .unwrap()
                .material_blueprint_asset_id,
            AssetId::from_name("DepthBlueprint")
        );
    }

    #[test]
    fn empty_technique_list_selects_nothing() {
        let instance = MaterialInstance::new(AssetId::from_name("M"));
        assert!(instance.select_technique(DEFAULT_TECHNIQUE_ID).is_none());
    }
}
