//! The whole data flow in one test: binary assets stream through the
//! loaders into GPU objects, a material instance resolves through its
//! blueprint to a cached pipeline state, and the compositor records and
//! submits a frame.

use render_runtime::compositor::ViewDescriptor;
use render_runtime::config::RenderConfig;
use render_runtime::material::blueprint::{
    BufferUsageSemantic, MaterialBlueprint, PassValueProvider, SamplerStateDefinition,
    TextureDefinition, UniformBufferDefinition,
};
use render_runtime::material::instance::{MaterialInstance, MaterialTechnique, DEFAULT_TECHNIQUE_ID};
use render_runtime::material::property::{
    AssetId, MaterialProperties, MaterialProperty, MaterialPropertyId, MaterialPropertyUsage,
    MaterialPropertyValue,
};
use render_runtime::material::shader_properties::ShaderProperties;
use render_runtime::render_assets::asset_ids::AssetIdMapping;
use render_runtime::render_assets::material_asset::write_material;
use render_runtime::render_assets::material_blueprint::write_material_blueprint;
use render_runtime::render_assets::mesh::{write_mesh, MeshResource, SubMesh};
use render_runtime::render_assets::shader_blueprint::{
    write_shader_blueprint, ShaderBlueprintResource, ShaderStage,
};
use render_runtime::render_assets::texture::{write_texture, TextureResource};
use render_runtime::render_types::root_signature::{
    DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureDescriptor,
    RootSignatureFlags, ShaderVisibility,
};
use render_runtime::render_types::types::{
    ClearFlags, ColorRgba, IndexBufferFormat, PrimitiveTopology, TextureFormat, Viewport,
};
use render_runtime::runtime::RendererRuntime;

struct NoPassValues;

impl PassValueProvider for NoPassValues {
    fn pass_value(&self, _property_id: MaterialPropertyId) -> Option<MaterialPropertyValue> {
        None
    }
}

fn table(range_type: DescriptorRangeType, register_name: &str) -> RootParameter {
    RootParameter::DescriptorTable {
        descriptor_ranges: vec![DescriptorRange::new(range_type, 1, 0, register_name)],
        shader_visibility: ShaderVisibility::All,
    }
}

fn blueprint_bytes() -> Vec<u8> {
    let mut blueprint = MaterialBlueprint::new(AssetId::from_name("ForwardBlueprint"));
    blueprint.schema = MaterialProperties::from_unsorted(vec![
        MaterialProperty::new(
            MaterialPropertyId::from_name("Metalness"),
            MaterialPropertyUsage::Static,
            MaterialPropertyValue::Float(0.5),
        ),
        MaterialProperty::new(
            MaterialPropertyId::from_name("AlbedoMap"),
            MaterialPropertyUsage::Texture,
            MaterialPropertyValue::AssetId(AssetId::from_name("CrateAlbedo")),
        ),
    ])
    .unwrap();
    blueprint.root_signature = RootSignatureDescriptor {
        parameters: vec![
            table(DescriptorRangeType::Cbv, "MaterialUniformBuffer"),
            table(DescriptorRangeType::Sampler, "SamplerLinear"),
            table(DescriptorRangeType::Srv, "AlbedoMap"),
        ],
        static_samplers: Vec::new(),
        flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };
    blueprint.shader_stages.vertex = AssetId::from_name("ForwardVertex");
    blueprint.shader_stages.fragment = AssetId::from_name("ForwardFragment");
    blueprint.uniform_buffers.push(UniformBufferDefinition {
        root_parameter_index: 0,
        usage: BufferUsageSemantic::Material,
        number_of_elements: 1,
        number_of_bytes_per_element: 16,
        element_properties: vec![MaterialProperty::new(
            MaterialPropertyId::from_name("Metalness"),
            MaterialPropertyUsage::Static,
            MaterialPropertyValue::Float(0.5),
        )],
    });
    blueprint.sampler_states.push(SamplerStateDefinition {
        root_parameter_index: 1,
        sampler_state: Default::default(),
    });
    blueprint.textures.push(TextureDefinition {
        root_parameter_index: 2,
        default_texture_asset_id: AssetId::from_name("CrateAlbedo"),
        material_property_id: Some(MaterialPropertyId::from_name("AlbedoMap")),
    });

    let mut bytes = Vec::new();
    write_material_blueprint(&mut bytes, &blueprint).unwrap();
    bytes
}

fn shader_bytes(name: &str, stage: ShaderStage) -> Vec<u8> {
    let shader = ShaderBlueprintResource {
        asset_id: AssetId::from_name(name),
        stage,
        source_code: format!("void main() {{ /* {name} */ }}"),
        referenced_shader_properties: ShaderProperties::new(),
    };
    let mut bytes = Vec::new();
    write_shader_blueprint(&mut bytes, &shader).unwrap();
    bytes
}

fn material_bytes() -> Vec<u8> {
    let mut material = MaterialInstance::new(AssetId::from_name("CrateMaterial"));
    material.techniques.push(MaterialTechnique {
        material_technique_id: DEFAULT_TECHNIQUE_ID,
        material_blueprint_asset_id: AssetId::from_name("ForwardBlueprint"),
    });
    material.properties.set(MaterialProperty::new(
        MaterialPropertyId::from_name("Metalness"),
        MaterialPropertyUsage::Static,
        MaterialPropertyValue::Float(1.0),
    ));
    let mut bytes = Vec::new();
    write_material(&mut bytes, &material).unwrap();
    bytes
}

fn mesh_bytes() -> Vec<u8> {
    let mesh = MeshResource {
        bytes_per_vertex: 28,
        index_format: IndexBufferFormat::U16,
        vertex_data: vec![0u8; 3 * 28],
        index_data: vec![0, 0, 1, 0, 2, 0],
        vertex_attributes: Vec::new(),
        sub_meshes: vec![SubMesh {
            material_asset_id: AssetId::from_name("CrateMaterial"),
            primitive_topology: PrimitiveTopology::TriangleList,
            start_index_location: 0,
            number_of_indices: 3,
        }],
    };
    let mut bytes = Vec::new();
    write_mesh(&mut bytes, &mesh).unwrap();
    bytes
}

fn texture_bytes() -> Vec<u8> {
    let texture = TextureResource {
        width: 2,
        height: 2,
        number_of_slices: 1,
        texture_format: TextureFormat::Rgba8,
        data_contains_mipmaps: false,
        data: vec![0xffu8; 16],
    };
    let mut bytes = Vec::new();
    write_texture(&mut bytes, &texture).unwrap();
    bytes
}

#[test]
fn assets_stream_into_a_rendered_frame() {
    let mut runtime = RendererRuntime::new(
        &RenderConfig::default(),
        1,
        false,
        Box::new(NoPassValues),
        AssetIdMapping::new(),
    )
    .unwrap();

    let blueprint_asset = AssetId::from_name("ForwardBlueprint");
    runtime
        .load_material_blueprint(&blueprint_bytes(), blueprint_asset, false)
        .unwrap();
    runtime
        .load_shader_blueprint(
            &shader_bytes("ForwardVertex", ShaderStage::Vertex),
            AssetId::from_name("ForwardVertex"),
            &[blueprint_asset],
        )
        .unwrap();
    runtime
        .load_shader_blueprint(
            &shader_bytes("ForwardFragment", ShaderStage::Fragment),
            AssetId::from_name("ForwardFragment"),
            &[blueprint_asset],
        )
        .unwrap();
    runtime
        .load_material(&material_bytes(), AssetId::from_name("CrateMaterial"))
        .unwrap();
    runtime
        .load_texture(&texture_bytes(), AssetId::from_name("CrateAlbedo"))
        .unwrap();
    runtime
        .load_mesh(&mesh_bytes(), AssetId::from_name("CrateMesh"))
        .unwrap();

    let items = runtime
        .renderable_items(AssetId::from_name("CrateMesh"))
        .unwrap();
    assert_eq!(items.len(), 1);

    let view = ViewDescriptor {
        render_target: None,
        viewport: Viewport::from_size(800.0, 600.0),
        scissor: None,
        clear: Some((ClearFlags::COLOR | ClearFlags::DEPTH, ColorRgba::BLACK, 1.0, 0)),
        technique: DEFAULT_TECHNIQUE_ID,
        debug_name: "forward".into(),
        staging: Vec::new(),
    };
    let statistics = runtime.render_view(&view, &items).unwrap();
    assert_eq!(statistics.items_rendered, 1);
    assert_eq!(statistics.items_skipped, 0);

    // A second frame over the same items hits the pipeline-state cache.
    let statistics = runtime.render_view(&view, &items).unwrap();
    assert_eq!(statistics.items_rendered, 1);
    assert_eq!(runtime.compositor().pipeline_cache().number_of_hits(), 1);
}

#[test]
fn missing_shader_sources_degrade_to_skipped_items() {
    let mut runtime = RendererRuntime::new(
        &RenderConfig::default(),
        1,
        false,
        Box::new(NoPassValues),
        AssetIdMapping::new(),
    )
    .unwrap();

    // Blueprint and material, but no shader blueprints attached: pipeline
    // creation fails per item, the frame itself still completes.
    runtime
        .load_material_blueprint(&blueprint_bytes(), AssetId::from_name("ForwardBlueprint"), false)
        .unwrap();
    runtime
        .load_material(&material_bytes(), AssetId::from_name("CrateMaterial"))
        .unwrap();
    runtime
        .load_mesh(&mesh_bytes(), AssetId::from_name("CrateMesh"))
        .unwrap();

    let items = runtime
        .renderable_items(AssetId::from_name("CrateMesh"))
        .unwrap();
    let view = ViewDescriptor {
        render_target: None,
        viewport: Viewport::from_size(800.0, 600.0),
        scissor: None,
        clear: None,
        technique: DEFAULT_TECHNIQUE_ID,
        debug_name: String::new(),
        staging: Vec::new(),
    };
    let statistics = runtime.render_view(&view, &items).unwrap();
    assert_eq!(statistics.items_rendered, 0);
    assert_eq!(statistics.items_skipped, 1);
}
