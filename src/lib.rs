//! Data-driven rendering runtime. Applications record typed command packets
//! into a deferred command buffer, materials resolve through blueprints into
//! cached pipeline states, and exchangeable backends execute the packet
//! stream behind one abstract renderer contract.

pub mod config;
pub mod runtime;

pub use compositor;
pub use material;
pub use render_assets;
pub use render_backend;
pub use render_backend_traits;
pub use render_types;

use anyhow::Context;
use render_backend::backend::{create_render_backend, BackendKind};
use render_backend_traits::traits::RenderBackend;
use render_types::command_buffer::CommandBuffer;
use render_types::types::NativeWindowHandle;

use crate::config::RenderConfig;

/// Renderer construction from configuration: picks the backend by name and
/// forwards the debug switches. The window handle is an opaque
/// platform-specific integer.
pub fn create_renderer(
    config: &RenderConfig,
    native_window_handle: NativeWindowHandle,
    use_external_context: bool,
) -> anyhow::Result<Box<dyn RenderBackend>> {
    let kind: BackendKind = config
        .backend
        .parse()
        .with_context(|| format!("render backend selection '{}'", config.backend))?;
    Ok(create_render_backend(
        kind,
        native_window_handle,
        use_external_context,
        config.debug.validation,
    ))
}

/// Scoped debug event: records the begin packet immediately and the matching
/// end packet when dropped.
pub struct DebugEventScope<'a> {
    command_buffer: &'a mut CommandBuffer,
}

impl<'a> DebugEventScope<'a> {
    pub fn new(command_buffer: &'a mut CommandBuffer, name: &str) -> Self {
        command_buffer.begin_debug_event(name);
        Self { command_buffer }
    }

    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        self.command_buffer
    }
}

impl Drop for DebugEventScope<'_> {
    fn drop(&mut self) {
        self.command_buffer.end_debug_event();
    }
}

/// One-line per-type summary of the live resources, for shutdown logging.
pub fn log_statistics(backend: &dyn RenderBackend) {
    let statistics = backend.statistics();
    for resource_type in render_types::types::ResourceType::ALL {
        let current = statistics.number_of_current_resources(resource_type);
        if current > 0 {
            log::info!(
                "{}: {current} live {}(s)",
                backend.name(),
                resource_type.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_event_scope_balances_begin_and_end() {
        let mut command_buffer = CommandBuffer::new();
        {
            let mut scope = DebugEventScope::new(&mut command_buffer, "pass");
            scope.command_buffer().set_debug_marker("inside");
        }
        assert_eq!(command_buffer.number_of_packets(), 3);
    }

    #[test]
    fn renderer_creation_rejects_unknown_backends() {
        let config = RenderConfig {
            backend: "direct3d12".into(),
            ..RenderConfig::default()
        };
        assert!(create_renderer(&config, 0, false).is_err());
    }
}
