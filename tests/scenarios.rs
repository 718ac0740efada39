//! End-to-end scenarios against the headless renderer: resource lifecycle,
//! command submission, asset loading and cross-renderer isolation.

use render_runtime::config::RenderConfig;
use render_runtime::create_renderer;
use render_runtime::material::blueprint::{
    MaterialBlueprint, SamplerStateDefinition, TextureDefinition,
};
use render_runtime::material::property::{
    AssetId, MaterialProperties, MaterialProperty, MaterialPropertyId, MaterialPropertyUsage,
    MaterialPropertyValue,
};
use render_runtime::material::MaterialError;
use render_runtime::render_assets::asset_ids::AssetIdMapping;
use render_runtime::render_assets::material_blueprint::{
    load_material_blueprint, write_material_blueprint,
};
use render_runtime::render_assets::mesh::{load_mesh, write_mesh, MeshResource, SubMesh};
use render_runtime::render_assets::AssetLoadError;
use render_runtime::render_backend::backend::allocate_renderer_id;
use render_runtime::render_backend::backends::headless::HeadlessBackend;
use render_runtime::render_backend_traits::traits::{CommandReceiver, RenderBackend};
use render_runtime::render_backend_traits::types::Texture2dDescriptor;
use render_runtime::render_types::command_buffer::CommandBuffer;
use render_runtime::render_types::types::{
    ClearFlags, ColorRgba, IndexBufferFormat, PrimitiveTopology, TextureFormat,
};

fn headless() -> HeadlessBackend {
    HeadlessBackend::new(allocate_renderer_id(), true)
}

#[test]
fn s1_swap_chain_lifecycle() {
    let mut renderer = create_renderer(&RenderConfig::default(), 1, false).unwrap();
    let swap_chain = renderer.create_swap_chain(1).expect("swap chain creation");

    assert!(renderer.begin_scene());
    let mut command_buffer = CommandBuffer::new();
    command_buffer.clear(
        ClearFlags::COLOR | ClearFlags::DEPTH,
        ColorRgba::new(0.0, 0.0, 0.0, 1.0),
        1.0,
        0,
    );
    renderer.submit_command_buffer(&command_buffer);
    renderer.end_scene();
    renderer.finish();

    assert_eq!(renderer.statistics().number_of_current_resources_total(), 1);
    renderer.release_resource(swap_chain);
    assert_eq!(renderer.statistics().number_of_current_resources_total(), 0);
}

#[test]
fn s2_clear_arguments_reach_the_backend_unchanged() {
    let mut renderer = headless();
    let _swap_chain = renderer.create_swap_chain(1).unwrap();

    let mut command_buffer = CommandBuffer::new();
    command_buffer.clear(ClearFlags::COLOR, ColorRgba::new(1.0, 0.0, 0.0, 1.0), 1.0, 0);

    assert!(renderer.begin_scene());
    renderer.submit_command_buffer(&command_buffer);
    renderer.end_scene();

    let clear = renderer.last_clear().expect("a clear was executed");
    assert_eq!(clear.flags, ClearFlags::COLOR);
    assert_eq!(clear.color, ColorRgba::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(clear.z, 1.0);
    assert_eq!(clear.stencil, 0);
}

fn blueprint_with_shader_combinations(count: usize) -> MaterialBlueprint {
    let mut blueprint = MaterialBlueprint::new(AssetId::from_name("ScenarioBlueprint"));
    let mut properties = Vec::new();
    for index in 0..count {
        let name = format!("Option{index}");
        properties.push(MaterialProperty::new(
            MaterialPropertyId::from_name(&name),
            MaterialPropertyUsage::ShaderCombination,
            MaterialPropertyValue::Integer(0),
        ));
        blueprint
            .visual_importance
            .set(MaterialPropertyId::from_name(&name), index as i32);
        blueprint
            .maximum_integer_values
            .set(MaterialPropertyId::from_name(&name), 1);
    }
    blueprint.schema = MaterialProperties::from_unsorted(properties).unwrap();
    blueprint.sampler_states.push(SamplerStateDefinition {
        root_parameter_index: 0,
        sampler_state: Default::default(),
    });
    blueprint.textures.push(TextureDefinition {
        root_parameter_index: 1,
        default_texture_asset_id: AssetId::from_name("DefaultWhite"),
        material_property_id: None,
    });
    blueprint
}

#[test]
fn s3_blueprint_sections_load_with_their_counts() {
    let blueprint = blueprint_with_shader_combinations(3);
    let mut bytes = Vec::new();
    write_material_blueprint(&mut bytes, &blueprint).unwrap();
    assert_eq!(&bytes[0..4], b"MBR1");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);

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
fn s4_combination_explosion_is_refused_at_load() {
    let blueprint = blueprint_with_shader_combinations(5);
    let mut bytes = Vec::new();
    write_material_blueprint(&mut bytes, &blueprint).unwrap();

    let error = load_material_blueprint(
        &mut bytes.as_slice(),
        blueprint.asset_id,
        &AssetIdMapping::new(),
        false,
    )
    .unwrap_err();
    match &error {
        AssetLoadError::Material(MaterialError::TooManyShaderCombinationProperties {
            count,
            maximum,
        }) => {
            assert_eq!(*count, 5);
            assert_eq!(*maximum, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = error.to_string();
    assert!(message.contains('5') && message.contains('4'));
}

#[test]
fn s5_foreign_texture_binding_is_a_silent_no_op() {
    let mut owning = headless();
    let mut foreign = headless();

    let texture = owning
        .create_texture_2d(&Texture2dDescriptor::new(64, 64, TextureFormat::Rgba8), None)
        .unwrap();

    foreign.set_graphics_root_descriptor_table(0, texture);
    assert_eq!(foreign.current_descriptor_table(0), None);
    assert_eq!(foreign.statistics().number_of_current_resources_total(), 0);
    // The owner still holds the only reference.
    assert_eq!(owning.statistics().number_of_current_resources_total(), 1);
    owning.release_resource(texture);
}

#[test]
fn s6_mesh_loads_with_exact_buffer_sizes() {
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
    assert_eq!(&bytes[0..4], b"MSH1");

    let loaded = load_mesh(&mut bytes.as_slice(), &AssetIdMapping::new()).unwrap();
    assert_eq!(loaded.sub_meshes[0].number_of_indices, 3);
    assert_eq!(loaded.vertex_data.len(), 3 * 28);
    assert_eq!(loaded.number_of_vertices(), 3);
    assert_eq!(loaded.number_of_indices(), 3);

    // The uploaded vertex buffer carries exactly those bytes.
    let mut renderer = headless();
    let gpu_mesh = loaded.upload(&mut renderer).unwrap();
    assert_eq!(
        renderer.resource_data(gpu_mesh.vertex_buffer).unwrap().len(),
        3 * 28
    );
    gpu_mesh.release(&mut renderer);
    assert_eq!(renderer.statistics().number_of_current_resources_total(), 0);
}
