use crate::game::beatmap::{BeatmapSettings, DEFAULT_DROP_SPEED, DEFAULT_LINES};
use crate::game::column::DEFAULT_DETECTION_DISTANCE;
use crate::game::player::{DEFAULT_END_DELAY_SECONDS, PlayerSettings};
use crate::game::timing::{DEFAULT_BPM, Division};
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "beatline.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    pub fn parse(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let section = line[1..line.len() - 1].trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            // Key/value pair: key=value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Where `.bmap` files live.
    pub data_directory: PathBuf,
    pub end_delay_seconds: f32,
    // Drop-axis units, not seconds.
    pub detection_distance: f32,
    /// Ticks per second for the headless runner.
    pub tick_rate: u32,
    pub default_bpm: u32,
    pub default_lines: usize,
    pub default_drop_speed: f32,
    pub default_division: Division,
}

fn default_data_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "beatline")
        .map(|dirs| dirs.data_dir().join("maps"))
        .unwrap_or_else(|| PathBuf::from("maps"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            data_directory: default_data_directory(),
            end_delay_seconds: DEFAULT_END_DELAY_SECONDS,
            detection_distance: DEFAULT_DETECTION_DISTANCE,
            tick_rate: 60,
            default_bpm: DEFAULT_BPM,
            default_lines: DEFAULT_LINES,
            default_drop_speed: DEFAULT_DROP_SPEED,
            default_division: Division::Quarter,
        }
    }
}

impl Config {
    pub fn beatmap_settings(&self) -> BeatmapSettings {
        BeatmapSettings {
            bpm: self.default_bpm,
            lines: self.default_lines,
            division: self.default_division,
            drop_speed: self.default_drop_speed,
            start_point_seconds: 0.0,
        }
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            end_delay_seconds: self.end_delay_seconds,
            detection_distance: self.detection_distance,
        }
    }

    /// Reads every known key, keeping the default for anything missing or
    /// unparsable.
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let default = Self::default();
        let positive = |v: f32| v.is_finite() && v > 0.0;
        Self {
            log_level: conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level),
            data_directory: conf
                .get("Options", "DataDirectory")
                .filter(|v| !v.is_empty())
                .map_or(default.data_directory, PathBuf::from),
            end_delay_seconds: conf
                .get("Options", "EndDelaySeconds")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.end_delay_seconds),
            detection_distance: conf
                .get("Options", "DetectionDistance")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| positive(*v))
                .unwrap_or(default.detection_distance),
            tick_rate: conf
                .get("Options", "TickRate")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.tick_rate),
            default_bpm: conf
                .get("Beatmap", "DefaultBpm")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.default_bpm),
            default_lines: conf
                .get("Beatmap", "DefaultLines")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.default_lines),
            default_drop_speed: conf
                .get("Beatmap", "DefaultDropSpeed")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| positive(*v))
                .unwrap_or(default.default_drop_speed),
            default_division: conf
                .get("Beatmap", "DefaultDivision")
                .and_then(|v| Division::from_str(&v).ok())
                .unwrap_or(default.default_division),
        }
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

fn render(cfg: &Config) -> String {
    let mut content = String::new();

    // [Options] section - keys in alphabetical order
    content.push_str("[Options]\n");
    content.push_str(&format!("DataDirectory={}\n", cfg.data_directory.display()));
    content.push_str(&format!("DetectionDistance={}\n", cfg.detection_distance));
    content.push_str(&format!("EndDelaySeconds={}\n", cfg.end_delay_seconds));
    content.push_str(&format!("LogLevel={}\n", cfg.log_level.as_str()));
    content.push_str(&format!("TickRate={}\n", cfg.tick_rate));
    content.push('\n');

    content.push_str("[Beatmap]\n");
    content.push_str(&format!("DefaultBpm={}\n", cfg.default_bpm));
    content.push_str(&format!("DefaultDivision={}\n", cfg.default_division));
    content.push_str(&format!("DefaultDropSpeed={}\n", cfg.default_drop_speed));
    content.push_str(&format!("DefaultLines={}\n", cfg.default_lines));
    content.push('\n');

    content
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    std::fs::write(path, render(&Config::default()))
}

pub fn load() {
    load_from(CONFIG_PATH);
}

pub fn load_from<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    if !path.exists()
        && let Err(e) = create_default_config_file(path)
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(path) {
        Ok(()) => {
            *CONFIG.lock().unwrap() = Config::from_ini(&conf);
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
        }
    }
}

pub fn get() -> Config {
    CONFIG.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::{Config, LogLevel, SimpleIni, render};
    use crate::game::timing::Division;
    use std::path::PathBuf;

    #[test]
    fn ini_sections_and_comments() {
        let mut ini = SimpleIni::new();
        ini.parse("; comment\n[Options]\nLogLevel = Debug\n# another\n\n[Beatmap]\nDefaultBpm=150\nbroken line\n");
        assert_eq!(ini.get("Options", "LogLevel").as_deref(), Some("Debug"));
        assert_eq!(ini.get("Beatmap", "DefaultBpm").as_deref(), Some("150"));
        assert_eq!(ini.get("Beatmap", "LogLevel"), None);
    }

    #[test]
    fn every_key_falls_back_on_its_own() {
        let mut ini = SimpleIni::new();
        ini.parse(
            "[Options]\nLogLevel=loud\nEndDelaySeconds=1.5\nDetectionDistance=-2\nTickRate=0\nDataDirectory=/tmp/maps\n\
             [Beatmap]\nDefaultBpm=abc\nDefaultLines=6\nDefaultDivision=32\nDefaultDropSpeed=7.5\n",
        );
        let cfg = Config::from_ini(&ini);
        let default = Config::default();
        assert_eq!(cfg.log_level, default.log_level);
        assert_eq!(cfg.end_delay_seconds, 1.5);
        assert_eq!(cfg.detection_distance, default.detection_distance);
        assert_eq!(cfg.tick_rate, default.tick_rate);
        assert_eq!(cfg.data_directory, PathBuf::from("/tmp/maps"));
        assert_eq!(cfg.default_bpm, 130);
        assert_eq!(cfg.default_lines, 6);
        assert_eq!(cfg.default_division, Division::Eighth);
        assert_eq!(cfg.beatmap_settings().drop_speed, 7.5);
    }

    #[test]
    fn rendered_defaults_parse_back() {
        let default = Config::default();
        let mut ini = SimpleIni::new();
        ini.parse(&render(&default));
        assert_eq!(Config::from_ini(&ini), default);
    }

    #[test]
    fn log_levels_map_onto_filters() {
        assert_eq!("TRACE".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!(LogLevel::Off.as_level_filter(), log::LevelFilter::Off);
        assert_eq!(LogLevel::Info.as_level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn player_settings_follow_options() {
        let mut ini = SimpleIni::new();
        ini.parse("[Options]\nEndDelaySeconds=0\nDetectionDistance=0.8\n");
        let settings = Config::from_ini(&ini).player_settings();
        assert_eq!(settings.end_delay_seconds, 0.0);
        assert_eq!(settings.detection_distance, 0.8);
    }
}
