#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use inkpanel::config::{
    CacheSection, ComposeSection, ConfigFile, DeviceSection, LivenessSection, MetricsSection,
    NotifySection, PanelConfig, PipelineSection, RawConfigFile, RemoteSection, RendererKind,
    RetrySection, ServerSection, UpdateSection, WallConfig,
};
use inkpanel::errors::Result;
use inkpanel::render::{PanelRenderer, PanelSpec, Placement};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            config: RawConfigFile {
                device: DeviceSection { width, height },
                update: UpdateSection::default(),
                retry: RetrySection::default(),
                liveness: LivenessSection::default(),
                remote: None,
                server: ServerSection::default(),
                pipeline: PipelineSection::default(),
                notify: NotifySection::default(),
                metrics: MetricsSection::default(),
                cache: CacheSection::default(),
                compose: ComposeSection::default(),
                wall: Vec::new(),
                panel: Vec::new(),
            },
        }
    }

    pub fn with_panel(mut self, panel: PanelConfig) -> Self {
        self.config.panel.push(panel);
        self
    }

    pub fn with_wall(mut self, path: impl Into<PathBuf>, x: i64, y: i64) -> Self {
        self.config.wall.push(WallConfig {
            path: path.into(),
            x,
            y,
        });
        self
    }

    pub fn with_z_order(mut self, order: &[&str]) -> Self {
        self.config.compose.z_order = Some(order.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_update(mut self, interval: u64, target_second: u32) -> Self {
        self.config.update = UpdateSection {
            interval,
            target_second,
        };
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay_secs: f64) -> Self {
        self.config.retry = RetrySection {
            attempts,
            delay_secs,
        };
        self
    }

    pub fn with_remote(mut self, host: &str) -> Self {
        let remote: RemoteSection = toml::from_str(&format!("host = {host:?}"))
            .expect("remote section from host");
        self.config.remote = Some(remote);
        self
    }

    pub fn with_liveness_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.liveness.file = path.into();
        self
    }

    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache.geometry_file = path.into();
        self
    }

    pub fn with_notify_footprint(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.notify.footprint = path.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.server.workers = workers;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

/// Builder for `PanelConfig`.
pub struct PanelConfigBuilder {
    panel: PanelConfig,
}

impl PanelConfigBuilder {
    pub fn new(name: &str, kind: RendererKind) -> Self {
        Self {
            panel: PanelConfig {
                name: name.to_string(),
                kind,
                x: 0,
                y: 0,
                width: 10,
                height: 10,
                scale: None,
                path: None,
                command: None,
                args: Vec::new(),
            },
        }
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.panel.x = x;
        self.panel.y = y;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.panel.width = width;
        self.panel.height = height;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.panel.scale = Some(scale);
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.panel.path = Some(path.into());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.panel.command = Some(command.to_string());
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.panel.args.push(arg.to_string());
        self
    }

    pub fn build(self) -> PanelConfig {
        self.panel
    }
}

/// A `PanelSpec` with an arbitrary renderer, for driving the coordinator and
/// pipeline directly.
pub fn panel_spec(
    name: &str,
    renderer: impl PanelRenderer + 'static,
    (x, y): (i64, i64),
    (width, height): (u32, u32),
) -> PanelSpec {
    PanelSpec {
        name: name.to_string(),
        renderer: Arc::new(renderer),
        args: Vec::new(),
        width,
        height,
        placement: Placement { x, y, scale: None },
    }
}
