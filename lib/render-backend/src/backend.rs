//! Backend selection and renderer construction.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use render_backend_traits::traits::RenderBackend;
use render_types::types::{NativeWindowHandle, RendererId};

use crate::backends::headless::HeadlessBackend;
use crate::backends::null::NullBackend;

/// Process-wide renderer-identity allocator. Identities are never reused so
/// owner checks stay valid across renderer teardown.
static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

pub fn allocate_renderer_id() -> RendererId {
    RendererId(NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Null,
    Headless,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "null" => Ok(BackendKind::Null),
            "headless" => Ok(BackendKind::Headless),
            other => Err(anyhow!("unknown render backend '{other}'")),
        }
    }
}

/// Factory entry point. One renderer per call, each with its own identity.
/// `native_window_handle` and `use_external_context` are forwarded to the
/// backend; the CPU-side backends only remember them. A backend that fails
/// to come up is still returned and reports `is_initialized() == false`.
pub fn create_render_backend(
    kind: BackendKind,
    native_window_handle: NativeWindowHandle,
    use_external_context: bool,
    debug_enabled: bool,
) -> Box<dyn RenderBackend> {
    let renderer_id = allocate_renderer_id();
    log::debug!(
        "creating {kind:?} renderer {renderer_id:?} (window handle {native_window_handle:#x}, \
         external context: {use_external_context})"
    );
    match kind {
        BackendKind::Null => Box::new(NullBackend::new(renderer_id, debug_enabled)),
        BackendKind::Headless => Box::new(HeadlessBackend::new(renderer_id, debug_enabled)),
    }
}
