use std::fs;
use std::path::{Path, PathBuf};

use crate::clipper::{ClipperParams, ParamId};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeKind {
    Dark,
    Light,
}

impl ThemeKind {
    pub const ALL: [ThemeKind; 2] = [ThemeKind::Dark, ThemeKind::Light];

    pub fn label(self) -> &'static str {
        match self {
            ThemeKind::Dark => "Dark",
            ThemeKind::Light => "Light",
        }
    }

    pub fn from_key(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "light" => ThemeKind::Light,
            _ => ThemeKind::Dark,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            ThemeKind::Dark => "dark",
            ThemeKind::Light => "light",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    pub theme: ThemeKind,
    pub params: ClipperParams,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: ThemeKind::Dark,
            params: ClipperParams::default(),
            input_device: None,
            output_device: None,
        }
    }
}

impl AppSettings {
    /// Reads settings from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(err) => {
                log::debug!("No settings at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Parses `key=value` lines. Unknown keys and bad values are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut settings = AppSettings::default();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                apply_kv(key.trim(), value.trim(), &mut settings);
            }
        }
        settings
    }

    pub fn render(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!("theme={}\n", self.theme.as_key()));
        if let Some(name) = &self.input_device {
            buf.push_str(&format!("input_device={name}\n"));
        }
        if let Some(name) = &self.output_device {
            buf.push_str(&format!("output_device={name}\n"));
        }
        for id in ParamId::ALL {
            buf.push_str(&format!("{}={}\n", id.key(), self.params.get(id)));
        }
        buf
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("fw_clipper.cfg")
}

fn apply_kv(key: &str, value: &str, settings: &mut AppSettings) {
    match key {
        "theme" => settings.theme = ThemeKind::from_key(value),
        "input_device" => settings.input_device = non_empty(value),
        "output_device" => settings.output_device = non_empty(value),
        _ => {
            if let Some(id) = ParamId::from_key(key) {
                if let Ok(v) = value.parse::<f32>() {
                    settings.params.set(id, v);
                }
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(roaming) = std::env::var("APPDATA") {
            return PathBuf::from(roaming).join("FW Clipper");
        }
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local).join("FW Clipper");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home_dir() {
            return home
                .join("Library")
                .join("Application Support")
                .join("FW Clipper");
        }
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fw-clipper");
    }

    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fw-clipper")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from).or_else(|| {
        #[cfg(target_os = "windows")]
        {
            std::env::var("USERPROFILE").ok().map(PathBuf::from)
        }
        #[cfg(not(target_os = "windows"))]
        {
            None
        }
    })
}
