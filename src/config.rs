use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const CONFIG_SECTION: &str = "Planner";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame quantum must be a power of two, got {0}ms")]
    InvalidQuantum(u32),

    #[error("pointer cap must be between 1 and 255, got {0}")]
    InvalidCap(usize),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

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
            if let Some(eq_idx) = line.find('=') {
                let (key_raw, value_raw) = line.split_at(eq_idx);
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                let value = value_raw[1..].trim().to_string();
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

// --- Enumerated settings ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsolidationPolicy {
    /// One region per demand.
    None,
    /// Fold demands onto nearby resting contacts.
    Proximity,
    /// Merge overlapping judgment strips.
    Geometric,
}

impl ConsolidationPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Proximity => "Proximity",
            Self::Geometric => "Geometric",
        }
    }
}

impl FromStr for ConsolidationPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "identity" | "conservative" => Ok(Self::None),
            "proximity" | "greedy" => Ok(Self::Proximity),
            "geometric" | "merge" => Ok(Self::Geometric),
            _ => Err(()),
        }
    }
}

/// Where a demand that needs a fresh press looks for its contact first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreshPress {
    /// Take an idle pointer; lift-and-repress a resting one only when none is idle.
    NewContact,
    /// Lift the nearest resting pointer and press it again before touching the idle pool.
    LiftAndRepress,
}

impl FreshPress {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewContact => "NewContact",
            Self::LiftAndRepress => "LiftAndRepress",
        }
    }
}

impl FromStr for FreshPress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newcontact" | "new" => Ok(Self::NewContact),
            "liftandrepress" | "repress" | "reuse" => Ok(Self::LiftAndRepress),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecycleCadence {
    /// Only frames holding a tap or a hold start lift resting pointers.
    Keyframe,
    EveryFrame,
}

impl RecycleCadence {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyframe => "Keyframe",
            Self::EveryFrame => "EveryFrame",
        }
    }
}

impl FromStr for RecycleCadence {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyframe" => Ok(Self::Keyframe),
            "everyframe" | "immediate" => Ok(Self::EveryFrame),
            _ => Err(()),
        }
    }
}

/// Which strip/border crossing an off-screen demand is moved to. A note at
/// (-50, 360) on a vertical line of a 1280x720 screen lands on (640, 360)
/// with `Midpoint` (the default) and on (0, 360) with `NearestEdge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StripAnchor {
    /// Midpoint of the visible chord of the strip axis.
    Midpoint,
    /// Border crossing closest to the nominal position.
    NearestEdge,
}

impl StripAnchor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Midpoint => "Midpoint",
            Self::NearestEdge => "NearestEdge",
        }
    }
}

impl FromStr for StripAnchor {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midpoint" | "center" => Ok(Self::Midpoint),
            "nearestedge" | "nearest" | "edge" => Ok(Self::NearestEdge),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
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
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

/// Installs `env_logger` and narrows it to `level`.
pub fn install_logger(level: LogLevel) {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    log::set_max_level(level.as_level_filter());
}

// --- Planner configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum number of simultaneous contacts the host recognizes.
    pub pointer_cap: usize,
    /// First pointer id handed out; ids are `offset..offset + cap`.
    pub pointer_id_offset: u32,
    /// Frame bucket width. 1 keeps raw milliseconds.
    pub frame_quantum_ms: u32,
    pub consolidation: ConsolidationPolicy,
    /// Proximity policy: largest offset (px, along the judgment line) at
    /// which a resting contact still lies in a demand's strip.
    pub proximity_threshold: f64,
    /// Geometric policy: strip width in px. `None` uses a tenth of the screen width.
    pub strip_width: Option<f64>,
    /// How far (px) a resting pointer may be from a demand to be reused.
    /// `None` means any distance.
    pub reuse_radius: Option<f64>,
    pub fresh_press: FreshPress,
    pub recycle: RecycleCadence,
    /// A resting pointer is lifted once it has been idle this long.
    pub grace_ms: u32,
    /// Beats searched forwards and backwards when an off-screen demand has
    /// no usable strip.
    pub correction_search_steps: u32,
    pub strip_anchor: StripAnchor,
    pub log_level: LogLevel,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::conservative()
    }
}

impl PlannerConfig {
    /// One contact per demand; taps always get an idle pointer. Resting
    /// pointers are only lifted on keyframes.
    pub const fn conservative() -> Self {
        Self {
            pointer_cap: 10,
            pointer_id_offset: 0,
            frame_quantum_ms: 1,
            consolidation: ConsolidationPolicy::None,
            proximity_threshold: 100.0,
            strip_width: None,
            reuse_radius: Some(200.0),
            fresh_press: FreshPress::NewContact,
            recycle: RecycleCadence::Keyframe,
            grace_ms: 1,
            correction_search_steps: 9,
            strip_anchor: StripAnchor::Midpoint,
            log_level: LogLevel::Warn,
        }
    }

    /// Greedy reuse of resting contacts that already sit in a demand's strip.
    pub const fn proximity() -> Self {
        Self {
            pointer_id_offset: 1000,
            consolidation: ConsolidationPolicy::Proximity,
            reuse_radius: None,
            fresh_press: FreshPress::LiftAndRepress,
            recycle: RecycleCadence::EveryFrame,
            grace_ms: 100,
            ..Self::conservative()
        }
    }

    /// 8ms frames with overlapping strips merged into one contact.
    pub const fn geometric() -> Self {
        Self {
            pointer_id_offset: 1000,
            frame_quantum_ms: 8,
            consolidation: ConsolidationPolicy::Geometric,
            reuse_radius: None,
            fresh_press: FreshPress::LiftAndRepress,
            recycle: RecycleCadence::EveryFrame,
            grace_ms: 1,
            ..Self::conservative()
        }
    }

    /// The three presets, least to most aggressive.
    pub const fn fallback_chain() -> [Self; 3] {
        [Self::conservative(), Self::proximity(), Self::geometric()]
    }

    pub fn label(&self) -> String {
        format!(
            "{}/{}ms/cap {}",
            self.consolidation.as_str(),
            self.frame_quantum_ms,
            self.pointer_cap
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pointer_cap == 0 || self.pointer_cap > usize::from(u8::MAX) {
            return Err(ConfigError::InvalidCap(self.pointer_cap));
        }
        if !self.frame_quantum_ms.is_power_of_two() {
            return Err(ConfigError::InvalidQuantum(self.frame_quantum_ms));
        }
        if self.pointer_id_offset.checked_add(self.pointer_cap as u32).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "PointerIdOffset",
                value: self.pointer_id_offset.to_string(),
            });
        }
        if !(self.proximity_threshold.is_finite() && self.proximity_threshold >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "ProximityThreshold",
                value: self.proximity_threshold.to_string(),
            });
        }
        if let Some(w) = self.strip_width
            && !(w.is_finite() && w > 0.0)
        {
            return Err(ConfigError::InvalidValue {
                key: "StripWidth",
                value: w.to_string(),
            });
        }
        Ok(())
    }

    // --- File I/O ---

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut conf = SimpleIni::new();
        conf.load(path)?;
        info!("Loaded planner config from {path:?}.");
        let config = Self::from_ini(&conf);
        config.apply_log_level();
        Ok(config)
    }

    /// Narrows the installed logger to this config's `log_level`.
    pub fn apply_log_level(&self) {
        log::set_max_level(self.log_level.as_level_filter());
    }

    pub fn from_ini_str(content: &str) -> Self {
        let mut conf = SimpleIni::new();
        conf.parse(content);
        Self::from_ini(&conf)
    }

    /// Missing or malformed keys keep the chosen preset's value.
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let base = match conf.get(CONFIG_SECTION, "Preset") {
            None => Self::default(),
            Some(v) => match ConsolidationPolicy::from_str(&v) {
                Ok(ConsolidationPolicy::None) => Self::conservative(),
                Ok(ConsolidationPolicy::Proximity) => Self::proximity(),
                Ok(ConsolidationPolicy::Geometric) => Self::geometric(),
                Err(()) => {
                    warn!("Unknown planner preset '{v}', using defaults.");
                    Self::default()
                }
            },
        };

        let get = |key: &str| conf.get(CONFIG_SECTION, key);

        Self {
            pointer_cap: parse_or("PointerCap", get("PointerCap"), base.pointer_cap),
            pointer_id_offset: parse_or(
                "PointerIdOffset",
                get("PointerIdOffset"),
                base.pointer_id_offset,
            ),
            frame_quantum_ms: parse_or(
                "FrameQuantumMs",
                get("FrameQuantumMs"),
                base.frame_quantum_ms,
            ),
            consolidation: parse_or("Consolidation", get("Consolidation"), base.consolidation),
            proximity_threshold: parse_or(
                "ProximityThreshold",
                get("ProximityThreshold"),
                base.proximity_threshold,
            ),
            strip_width: parse_optional("StripWidth", get("StripWidth"), base.strip_width),
            reuse_radius: parse_optional("ReuseRadius", get("ReuseRadius"), base.reuse_radius),
            fresh_press: parse_or("FreshPress", get("FreshPress"), base.fresh_press),
            recycle: parse_or("Recycle", get("Recycle"), base.recycle),
            grace_ms: parse_or("GraceMs", get("GraceMs"), base.grace_ms),
            correction_search_steps: parse_or(
                "CorrectionSearchSteps",
                get("CorrectionSearchSteps"),
                base.correction_search_steps,
            ),
            strip_anchor: parse_or("StripAnchor", get("StripAnchor"), base.strip_anchor),
            log_level: parse_or("LogLevel", get("LogLevel"), base.log_level),
        }
    }

    pub fn to_ini_string(&self) -> String {
        let mut content = String::new();
        content.push_str(&format!("[{CONFIG_SECTION}]\n"));
        content.push_str(&format!(
            "Consolidation={}\n",
            self.consolidation.as_str()
        ));
        content.push_str(&format!(
            "CorrectionSearchSteps={}\n",
            self.correction_search_steps
        ));
        content.push_str(&format!("FrameQuantumMs={}\n", self.frame_quantum_ms));
        content.push_str(&format!("FreshPress={}\n", self.fresh_press.as_str()));
        content.push_str(&format!("GraceMs={}\n", self.grace_ms));
        content.push_str(&format!("LogLevel={}\n", self.log_level.as_str()));
        content.push_str(&format!("PointerCap={}\n", self.pointer_cap));
        content.push_str(&format!("PointerIdOffset={}\n", self.pointer_id_offset));
        content.push_str(&format!(
            "ProximityThreshold={}\n",
            self.proximity_threshold
        ));
        content.push_str(&format!("Recycle={}\n", self.recycle.as_str()));
        content.push_str(&format!("ReuseRadius={}\n", optional_to_ini(self.reuse_radius)));
        content.push_str(&format!("StripAnchor={}\n", self.strip_anchor.as_str()));
        content.push_str(&format!("StripWidth={}\n", optional_to_ini(self.strip_width)));
        content
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ini_string())?;
        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, fallback: T) -> T {
    let Some(raw) = raw else {
        return fallback;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Invalid value '{raw}' for {key}, keeping default.");
            fallback
        }
    }
}

// "Auto", "None" or an empty value clear an optional distance.
fn parse_optional(key: &str, raw: Option<String>, fallback: Option<f64>) -> Option<f64> {
    let Some(raw) = raw else {
        return fallback;
    };
    let v = raw.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("auto") || v.eq_ignore_ascii_case("none") {
        return None;
    }
    match v.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Some(n),
        _ => {
            warn!("Invalid value '{raw}' for {key}, keeping default.");
            fallback
        }
    }
}

fn optional_to_ini(v: Option<f64>) -> String {
    v.map_or_else(|| "Auto".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for config in PlannerConfig::fallback_chain() {
            assert!(config.validate().is_ok(), "{}", config.label());
        }
    }

    #[test]
    fn non_power_of_two_quantum_is_rejected() {
        let config = PlannerConfig {
            frame_quantum_ms: 6,
            ..PlannerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidQuantum(6))));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let config = PlannerConfig {
            pointer_cap: 0,
            ..PlannerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCap(0))));
    }

    #[test]
    fn ini_overrides_preset_values() {
        let config = PlannerConfig::from_ini_str(concat!(
            "; planner settings\n[Planner]\nPreset=Geometric\n",
            "PointerCap=5\nStripWidth=64\nLogLevel=debug\n",
        ));
        assert_eq!(config.consolidation, ConsolidationPolicy::Geometric);
        assert_eq!(config.frame_quantum_ms, 8);
        assert_eq!(config.pointer_cap, 5);
        assert_eq!(config.strip_width, Some(64.0));
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let config = PlannerConfig::from_ini_str(
            "[Planner]\nPointerCap=lots\nRecycle=sometimes\nReuseRadius=-3\n",
        );
        let default = PlannerConfig::default();
        assert_eq!(config.pointer_cap, default.pointer_cap);
        assert_eq!(config.recycle, default.recycle);
        assert_eq!(config.reuse_radius, default.reuse_radius);
    }

    #[test]
    fn ini_text_reloads_to_the_same_config() {
        let original = PlannerConfig::proximity();
        let reloaded = PlannerConfig::from_ini_str(&original.to_ini_string());
        assert_eq!(reloaded, original);
    }

    #[test]
    fn loading_applies_the_log_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("planner.ini");
        let config = PlannerConfig {
            log_level: LogLevel::Error,
            ..PlannerConfig::geometric()
        };
        config.save(&path).expect("save");
        let loaded = PlannerConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
        assert_eq!(log::max_level(), log::LevelFilter::Error);
    }

    #[test]
    fn auto_clears_optional_distances() {
        let config = PlannerConfig::from_ini_str("[Planner]\nReuseRadius=Auto\n");
        assert_eq!(config.reuse_radius, None);
    }
}
