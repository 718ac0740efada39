pub mod blueprint;
pub mod instance;
pub mod pipeline_cache;
pub mod property;
pub mod shader_properties;

use thiserror::Error;

use crate::property::{MaterialPropertyId, MaterialPropertyUsage};

/// Default inclusive cap on the number of SHADER_COMBINATION properties one
/// blueprint may declare; bounds the shader-variant space at load time.
pub const MAXIMUM_NUMBER_OF_SHADER_COMBINATION_PROPERTIES: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterialError {
    #[error(
        "invalid pipeline state: {count} shader-combination properties exceed the limit of \
         {maximum} (the blueprint did not opt into a larger variant space)"
    )]
    TooManyShaderCombinationProperties { count: usize, maximum: usize },
    #[error("property {property_id:?} does not exist in the blueprint schema")]
    UnknownProperty { property_id: MaterialPropertyId },
    #[error(
        "property {property_id:?} override has usage {found:?}, the schema declares {expected:?}"
    )]
    UsageMismatch {
        property_id: MaterialPropertyId,
        expected: MaterialPropertyUsage,
        found: MaterialPropertyUsage,
    },
    #[error("property {property_id:?} override has a different value type than the schema")]
    ValueTypeMismatch { property_id: MaterialPropertyId },
    #[error("property vector is not strictly sorted by property id")]
    UnsortedProperties,
}
