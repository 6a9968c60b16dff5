// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [device]
/// width = 3200
/// height = 1800
///
/// [update]
/// interval = 60
///
/// [[panel]]
/// name = "clock"
/// kind = "clock"
/// x = 0
/// y = 0
/// width = 800
/// height = 200
/// ```
///
/// This is the *unvalidated* form; use [`ConfigFile`] (obtained through
/// `ConfigFile::try_from`) everywhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub device: DeviceSection,

    #[serde(default)]
    pub update: UpdateSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub liveness: LivenessSection,

    #[serde(default)]
    pub remote: Option<RemoteSection>,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub notify: NotifySection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub compose: ComposeSection,

    /// Static background images pasted before any panel.
    #[serde(default)]
    pub wall: Vec<WallConfig>,

    #[serde(default)]
    pub panel: Vec<PanelConfig>,
}

/// Validated configuration.
///
/// Fields are public for reading; construction goes through
/// `ConfigFile::try_from(RawConfigFile)` so every instance has passed
/// validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub device: DeviceSection,
    pub update: UpdateSection,
    pub retry: RetrySection,
    pub liveness: LivenessSection,
    pub remote: Option<RemoteSection>,
    pub server: ServerSection,
    pub pipeline: PipelineSection,
    pub notify: NotifySection,
    pub metrics: MetricsSection,
    pub cache: CacheSection,
    pub compose: ComposeSection,
    pub wall: Vec<WallConfig>,
    pub panel: Vec<PanelConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            device: raw.device,
            update: raw.update,
            retry: raw.retry,
            liveness: raw.liveness,
            remote: raw.remote,
            server: raw.server,
            pipeline: raw.pipeline,
            notify: raw.notify,
            metrics: raw.metrics,
            cache: raw.cache,
            compose: raw.compose,
            wall: raw.wall,
            panel: raw.panel,
        }
    }

    /// Panel names in compositing order (first is drawn first, i.e. bottom).
    pub fn z_order(&self) -> Vec<&str> {
        match self.compose.z_order {
            Some(ref order) => order.iter().map(String::as_str).collect(),
            None => self.panel.iter().map(|p| p.name.as_str()).collect(),
        }
    }
}

/// `[device]`: final canvas size in pixels.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeviceSection {
    pub width: u32,
    pub height: u32,
}

/// `[update]`: periodic refresh cadence for the display driver.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpdateSection {
    /// Seconds between refreshes.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Second within the minute at which a refresh should complete.
    #[serde(default)]
    pub target_second: u32,
}

fn default_interval() -> u64 {
    60
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            target_second: 0,
        }
    }
}

/// `[retry]`: per-panel bounded retry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
}

fn default_attempts() -> u32 {
    5
}

fn default_delay_secs() -> f64 {
    5.0
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

/// `[liveness]`
#[derive(Debug, Clone, Deserialize)]
pub struct LivenessSection {
    #[serde(default = "default_liveness_file")]
    pub file: PathBuf,
}

fn default_liveness_file() -> PathBuf {
    PathBuf::from("/dev/shm/inkpanel.healthz")
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            file: default_liveness_file(),
        }
    }
}

/// `[remote]`: how to reach the frame-buffer host.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    pub host: String,

    #[serde(default = "default_remote_user")]
    pub user: String,

    /// Private key passed to `ssh -i`.
    #[serde(default)]
    pub key: Option<PathBuf>,

    #[serde(default = "default_viewer")]
    pub viewer: String,

    #[serde(default = "default_tmp_path")]
    pub tmp_path: String,

    #[serde(default = "default_framebuffer")]
    pub framebuffer: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_retry_secs")]
    pub connect_retry_secs: u64,
}

fn default_remote_user() -> String {
    "ubuntu".to_string()
}

fn default_viewer() -> String {
    "fbi".to_string()
}

fn default_tmp_path() -> String {
    "/dev/shm/display.png".to_string()
}

fn default_framebuffer() -> String {
    "/dev/fb0".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    2
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_retry_secs() -> u64 {
    2
}

/// `[server]`: the on-demand job service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub url_prefix: String,

    /// Config file handed to the pipeline for `mode=normal`.
    /// Defaults to the file the server itself was started with.
    #[serde(default)]
    pub normal_config: Option<PathBuf>,

    /// Config file handed to the pipeline for `mode=small`.
    #[serde(default)]
    pub small_config: Option<PathBuf>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    #[serde(default)]
    pub dummy_mode: bool,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_workers() -> usize {
    3
}

fn default_session_ttl_secs() -> u64 {
    60
}

fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            url_prefix: String::new(),
            normal_config: None,
            small_config: None,
            workers: default_workers(),
            session_ttl_secs: default_session_ttl_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            dummy_mode: false,
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineSection {
    /// Executable that implements the `render` subcommand. Defaults to the
    /// running binary.
    #[serde(default)]
    pub program: Option<PathBuf>,
}

/// `[notify]`
#[derive(Debug, Clone, Deserialize)]
pub struct NotifySection {
    /// Minimum minutes between two error notifications.
    #[serde(default = "default_interval_min")]
    pub interval_min: u64,

    /// Footprint file whose mtime records the last notification.
    #[serde(default = "default_footprint")]
    pub footprint: PathBuf,

    #[serde(default)]
    pub slack: Option<SlackSection>,
}

fn default_interval_min() -> u64 {
    10
}

fn default_footprint() -> PathBuf {
    PathBuf::from("data/error_notify")
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            interval_min: default_interval_min(),
            footprint: default_footprint(),
            slack: None,
        }
    }
}

/// `[notify.slack]`
#[derive(Debug, Clone, Deserialize)]
pub struct SlackSection {
    pub bot_token: String,
    pub channel: String,
    #[serde(default = "default_from")]
    pub from: String,
}

fn default_from() -> String {
    "inkpanel".to_string()
}

/// `[metrics]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSection {
    /// JSON-lines file; when absent metrics are only logged.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_geometry_file")]
    pub geometry_file: PathBuf,

    #[serde(default = "default_expire_hours")]
    pub expire_hours: u64,
}

fn default_geometry_file() -> PathBuf {
    PathBuf::from("data/geometry.cache")
}

fn default_expire_hours() -> u64 {
    1
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            geometry_file: default_geometry_file(),
            expire_hours: default_expire_hours(),
        }
    }
}

/// `[compose]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeSection {
    /// Explicit compositing order by panel name. Panels not listed are not
    /// drawn. Defaults to declaration order.
    #[serde(default)]
    pub z_order: Option<Vec<String>>,
}

/// `[[wall]]`
#[derive(Debug, Clone, Deserialize)]
pub struct WallConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

/// Built-in renderer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Blank,
    Clock,
    Image,
    Command,
}

/// `[[panel]]`
#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub name: String,

    pub kind: RendererKind,

    #[serde(default)]
    pub x: i64,

    #[serde(default)]
    pub y: i64,

    pub width: u32,

    pub height: u32,

    /// Optional resize factor applied after rendering.
    #[serde(default)]
    pub scale: Option<f32>,

    /// Source file for `kind = "image"`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Program for `kind = "command"`.
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments forwarded to the renderer.
    #[serde(default)]
    pub args: Vec<String>,
}
