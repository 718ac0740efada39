use render_types::types::ColorRgba;
use serde::{Deserialize, Serialize};

/// Debug behavior of a renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfigDebug {
    /// Extra validation plus diagnostics for dropped commands.
    pub validation: bool,
    /// Forward debug markers/events to the backend even in release builds.
    pub debug_markers: bool,
    /// Verbose creation/destruction logging.
    pub verbose: bool,
}

impl Default for ConfigDebug {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            debug_markers: cfg!(debug_assertions),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigGfx {
    pub msaa_samples: u32,
    pub vsync: bool,
    /// Default clear color of the main render target.
    pub clear_color: ColorRgba,
}

impl Default for ConfigGfx {
    fn default() -> Self {
        Self {
            msaa_samples: 0,
            vsync: false,
            clear_color: ColorRgba::BLACK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub debug: ConfigDebug,
    #[serde(default)]
    pub gfx: ConfigGfx,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            debug: ConfigDebug::default(),
            gfx: ConfigGfx::default(),
        }
    }
}

fn default_backend() -> String {
    "headless".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pick_the_headless_backend() {
        let config = RenderConfig::default();
        assert_eq!(config.backend, "headless");
        assert_eq!(config.gfx.msaa_samples, 0);
    }
}
