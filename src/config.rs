use anyhow::Context;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    time::Duration,
};

use crate::opacity::{OPACITY_MAX, OPACITY_MIN};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sliders: SliderSettings,
    pub window: WindowSettings,
    pub media: MediaSettings,
    pub os: OsSettings,
}

impl Default for Config {
    fn default() -> Self {
        ConfigDocument::default().into()
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    /// First existing config file, checked next to the working directory and then the executable.
    pub fn locate() -> Option<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("overlay.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("overlay.toml"));
            }
        }

        candidates.into_iter().find(|path| path.exists())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliderSettings {
    pub volume_debounce: Duration,
    pub opacity_debounce: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSettings {
    pub width: f32,
    pub height: f32,
    pub min_width: f32,
    pub min_height: f32,
    pub always_on_top: bool,
    pub initial_opacity: i32,
    pub drag_region_height: f32,
    pub resize_margin: f32,
    pub corner_radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSettings {
    pub poll_playing: Duration,
    pub poll_idle: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsSettings {
    /// Expected upper bound for one synchronous OS call.
    pub call_budget: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    sliders: SlidersSection,
    #[serde(default)]
    window: WindowSection,
    #[serde(default)]
    media: MediaSection,
    #[serde(default)]
    os: OsSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let window = value.window;
        let min_width = window.min_width.unwrap_or(400.0).max(120.0);
        let min_height = window.min_height.unwrap_or(150.0).max(80.0);

        Config {
            sliders: SliderSettings {
                volume_debounce: Duration::from_millis(
                    value.sliders.volume_debounce_ms.unwrap_or(50),
                ),
                opacity_debounce: Duration::from_millis(
                    value.sliders.opacity_debounce_ms.unwrap_or(16),
                ),
            },
            window: WindowSettings {
                width: window.width.unwrap_or(400.0).max(min_width),
                height: window.height.unwrap_or(150.0).max(min_height),
                min_width,
                min_height,
                always_on_top: window.always_on_top.unwrap_or(true),
                initial_opacity: window
                    .initial_opacity
                    .unwrap_or(OPACITY_MAX)
                    .clamp(OPACITY_MIN, OPACITY_MAX),
                drag_region_height: window.drag_region_height.unwrap_or(36.0).max(8.0),
                resize_margin: window.resize_margin.unwrap_or(6.0).clamp(2.0, 24.0),
                corner_radius: window.corner_radius.unwrap_or(15.0).clamp(0.0, 40.0),
            },
            media: MediaSettings {
                poll_playing: Duration::from_millis(
                    value.media.poll_playing_ms.unwrap_or(800).max(100),
                ),
                poll_idle: Duration::from_millis(value.media.poll_idle_ms.unwrap_or(3000).max(100)),
            },
            os: OsSettings {
                call_budget: Duration::from_millis(value.os.call_budget_ms.unwrap_or(250).max(1)),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SlidersSection {
    volume_debounce_ms: Option<u64>,
    opacity_debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowSection {
    width: Option<f32>,
    height: Option<f32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
    always_on_top: Option<bool>,
    initial_opacity: Option<i32>,
    drag_region_height: Option<f32>,
    resize_margin: Option<f32>,
    corner_radius: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaSection {
    poll_playing_ms: Option<u64>,
    poll_idle_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OsSection {
    call_budget_ms: Option<u64>,
}

/// Watches the config file and hands back a fresh `Config` after each edit.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn watch(path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .context("Failed to create config watcher")?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", path.display()))?;

        Ok(Self {
            path,
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drains pending events; reloads once if any of them modified the file.
    pub fn poll(&mut self) -> Option<anyhow::Result<Config>> {
        let mut changed = false;
        loop {
            match self.changes_rx.try_recv() {
                Ok(Ok(event)) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        changed = true;
                    }
                }
                Ok(Err(err)) => log::warn!("config watcher error: {err}"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed.then(|| Config::load_from(&self.path))
    }
}
