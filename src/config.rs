use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;
use std::str::FromStr;

use crate::model::auto::AutoParams;
use crate::model::grid::GridParams;
use crate::model::{EnsembleParams, KalmanParams, ModelError, PriceTransform};
use crate::stats::ResidualFilter;
use crate::strategy::SimpleStrategy;
use crate::tracker::TrackerKind;

const DEFAULT_ENTRY_Z: f64 = 2.0;
const DEFAULT_EXIT_Z: f64 = 0.0;
const DEFAULT_HOLDING_DAYS: u32 = 20;
const DEFAULT_DELTA: f64 = 1e-4;
const DEFAULT_DELTA_MIN: f64 = 1e-6;
const DEFAULT_DELTA_MAX: f64 = 1e-2;
const DEFAULT_DELTA_STEPS: usize = 9;
const DEFAULT_VE: f64 = 1e-3;
const DEFAULT_VE_MIN: f64 = 1e-4;
const DEFAULT_VE_MAX: f64 = 1e-2;
const DEFAULT_VE_STEPS: usize = 3;
const DEFAULT_USAGE_TARGET_PCT: f64 = 30.0;
const DEFAULT_USAGE_WIDTH_PCT: f64 = 15.0;
const DEFAULT_TRACKING_WINDOW: usize = 40;
const DEFAULT_LOOKBACK: usize = 10;
const DEFAULT_WARMUP_TICKS: usize = 0;
const DEFAULT_VIRTUAL_FEE: f64 = 0.001;
const DEFAULT_INHIBIT_THRESHOLD: f64 = 0.05;

#[derive(Debug)]
pub enum ConfigError {
    ParseIntError(ParseIntError),
    ParseFloatError(ParseFloatError),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
            ConfigError::ParseFloatError(e) => write!(f, "Parse float error: {}", e),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

impl From<ParseFloatError> for ConfigError {
    fn from(err: ParseFloatError) -> ConfigError {
        ConfigError::ParseFloatError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Kalman,
    Grid,
    #[default]
    Auto,
}

impl FromStr for ModelKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kalman" => Ok(ModelKind::Kalman),
            "grid" => Ok(ModelKind::Grid),
            "auto" => Ok(ModelKind::Auto),
            other => Err(format!("unknown model kind '{}'", other)),
        }
    }
}

/// How an entry signal is confirmed against the previous z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    #[default]
    Simple,
    RequireUptick,
    RequireDowntick,
}

impl FromStr for EntryMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(EntryMode::Simple),
            "require_uptick" | "uptick" => Ok(EntryMode::RequireUptick),
            "require_downtick" | "downtick" => Ok(EntryMode::RequireDowntick),
            other => Err(format!("unknown entry mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    #[default]
    DollarNeutral,
    BetaNeutral,
}

impl FromStr for SizingMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dollar_neutral" | "dollar" => Ok(SizingMode::DollarNeutral),
            "beta_neutral" | "beta" => Ok(SizingMode::BetaNeutral),
            other => Err(format!("unknown sizing mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TransformKind {
    #[default]
    None,
    InvertLeg1,
    InvertLeg2,
}

impl FromStr for TransformKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TransformKind::None),
            "invert_leg1" => Ok(TransformKind::InvertLeg1),
            "invert_leg2" => Ok(TransformKind::InvertLeg2),
            other => Err(format!("unknown price transform '{}'", other)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct ModelYaml {
    model_kind: Option<ModelKind>,
    entry_z_score: Option<f64>,
    exit_z_score: Option<f64>,
    allow_long: Option<bool>,
    allow_short: Option<bool>,
    holding_days: Option<u32>,
    holding_enabled: Option<bool>,
    entry_mode: Option<EntryMode>,
    sizing_mode: Option<SizingMode>,
    delta: Option<f64>,
    delta_min: Option<f64>,
    delta_max: Option<f64>,
    delta_steps: Option<usize>,
    ve: Option<f64>,
    ve_min: Option<f64>,
    ve_max: Option<f64>,
    ve_steps: Option<usize>,
    usage_target_pct: Option<f64>,
    usage_width_pct: Option<f64>,
    tracking_window: Option<usize>,
    tracker_kind: Option<TrackerKind>,
    lookback: Option<usize>,
    warmup_ticks: Option<usize>,
    virtual_fee: Option<f64>,
    residual_filter: Option<ResidualFilter>,
    inhibit_threshold: Option<f64>,
    kill_on_inhibit: Option<bool>,
    price_transform: Option<TransformKind>,
    transform_a: Option<f64>,
    transform_b: Option<f64>,
}

/// Strategy-level settings the execution layer hands to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_kind: ModelKind,
    pub entry_z: f64,
    pub exit_z: f64,
    pub allow_long: bool,
    pub allow_short: bool,
    pub holding_days: u32,
    pub holding_enabled: bool,
    pub entry_mode: EntryMode,
    pub sizing_mode: SizingMode,
    // single filter
    pub delta: f64,
    pub ve: f64,
    // grid bounds
    pub delta_min: f64,
    pub delta_max: f64,
    pub delta_steps: usize,
    pub ve_min: f64,
    pub ve_max: f64,
    pub ve_steps: usize,
    // trackers
    pub usage_target_pct: f64,
    pub usage_width_pct: f64,
    pub tracking_window: usize,
    pub tracker_kind: TrackerKind,
    pub residual_filter: ResidualFilter,
    pub inhibit_threshold: f64,
    pub kill_on_inhibit: bool,
    pub lookback: usize,
    pub warmup_ticks: usize,
    pub virtual_fee: f64,
    pub price_transform: PriceTransform,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::from_yaml(ModelYaml::default())
    }
}

impl ModelConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("KALMANPAIR_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open model config {}", path_ref.display()))?;
        let yaml: ModelYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse model config {}", path_ref.display()))?;
        let mut cfg = Self::from_yaml(yaml);
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let yaml: ModelYaml = serde_yaml::from_str(raw).context("failed to parse model config")?;
        let cfg = Self::from_yaml(yaml);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_yaml(yaml: ModelYaml) -> Self {
        let transform_a = yaml.transform_a.unwrap_or(1.0);
        let transform_b = yaml.transform_b.unwrap_or(0.0);
        ModelConfig {
            model_kind: yaml.model_kind.unwrap_or_default(),
            entry_z: yaml.entry_z_score.unwrap_or(DEFAULT_ENTRY_Z),
            exit_z: yaml.exit_z_score.unwrap_or(DEFAULT_EXIT_Z),
            allow_long: yaml.allow_long.unwrap_or(true),
            allow_short: yaml.allow_short.unwrap_or(true),
            holding_days: yaml.holding_days.unwrap_or(DEFAULT_HOLDING_DAYS),
            holding_enabled: yaml.holding_enabled.unwrap_or(true),
            entry_mode: yaml.entry_mode.unwrap_or_default(),
            sizing_mode: yaml.sizing_mode.unwrap_or_default(),
            delta: yaml.delta.unwrap_or(DEFAULT_DELTA),
            ve: yaml.ve.unwrap_or(DEFAULT_VE),
            delta_min: yaml.delta_min.unwrap_or(DEFAULT_DELTA_MIN),
            delta_max: yaml.delta_max.unwrap_or(DEFAULT_DELTA_MAX),
            delta_steps: yaml.delta_steps.unwrap_or(DEFAULT_DELTA_STEPS),
            ve_min: yaml.ve_min.unwrap_or(DEFAULT_VE_MIN),
            ve_max: yaml.ve_max.unwrap_or(DEFAULT_VE_MAX),
            ve_steps: yaml.ve_steps.unwrap_or(DEFAULT_VE_STEPS),
            usage_target_pct: yaml.usage_target_pct.unwrap_or(DEFAULT_USAGE_TARGET_PCT),
            usage_width_pct: yaml.usage_width_pct.unwrap_or(DEFAULT_USAGE_WIDTH_PCT),
            tracking_window: yaml.tracking_window.unwrap_or(DEFAULT_TRACKING_WINDOW),
            tracker_kind: yaml.tracker_kind.unwrap_or_default(),
            residual_filter: yaml.residual_filter.unwrap_or_default(),
            inhibit_threshold: yaml
                .inhibit_threshold
                .unwrap_or(DEFAULT_INHIBIT_THRESHOLD),
            kill_on_inhibit: yaml.kill_on_inhibit.unwrap_or(false),
            lookback: yaml.lookback.unwrap_or(DEFAULT_LOOKBACK),
            warmup_ticks: yaml.warmup_ticks.unwrap_or(DEFAULT_WARMUP_TICKS),
            virtual_fee: yaml.virtual_fee.unwrap_or(DEFAULT_VIRTUAL_FEE),
            price_transform: build_transform(
                yaml.price_transform.unwrap_or_default(),
                transform_a,
                transform_b,
            ),
        }
    }

    fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        override_parsed("MODEL_KIND", &mut self.model_kind)?;
        override_parsed("ENTRY_Z_SCORE", &mut self.entry_z)?;
        override_parsed("EXIT_Z_SCORE", &mut self.exit_z)?;
        override_bool("ALLOW_LONG", &mut self.allow_long);
        override_bool("ALLOW_SHORT", &mut self.allow_short);
        override_parsed("HOLDING_DAYS", &mut self.holding_days)?;
        override_bool("HOLDING_ENABLED", &mut self.holding_enabled);
        override_parsed("ENTRY_MODE", &mut self.entry_mode)?;
        override_parsed("SIZING_MODE", &mut self.sizing_mode)?;
        override_parsed("KALMAN_DELTA", &mut self.delta)?;
        override_parsed("KALMAN_VE", &mut self.ve)?;
        override_parsed("DELTA_MIN", &mut self.delta_min)?;
        override_parsed("DELTA_MAX", &mut self.delta_max)?;
        override_parsed("DELTA_STEPS", &mut self.delta_steps)?;
        override_parsed("VE_MIN", &mut self.ve_min)?;
        override_parsed("VE_MAX", &mut self.ve_max)?;
        override_parsed("VE_STEPS", &mut self.ve_steps)?;
        override_parsed("USAGE_TARGET_PCT", &mut self.usage_target_pct)?;
        override_parsed("USAGE_WIDTH_PCT", &mut self.usage_width_pct)?;
        override_parsed("TRACKING_WINDOW", &mut self.tracking_window)?;
        override_parsed("TRACKER_KIND", &mut self.tracker_kind)?;
        override_parsed("RESIDUAL_FILTER", &mut self.residual_filter)?;
        override_parsed("INHIBIT_THRESHOLD", &mut self.inhibit_threshold)?;
        override_bool("KILL_ON_INHIBIT", &mut self.kill_on_inhibit);
        override_parsed("MODEL_LOOKBACK", &mut self.lookback)?;
        override_parsed("WARMUP_TICKS", &mut self.warmup_ticks)?;
        override_parsed("VIRTUAL_FEE", &mut self.virtual_fee)?;
        if let Ok(value) = env::var("PRICE_TRANSFORM") {
            let kind: TransformKind = parse_value("PRICE_TRANSFORM", &value)?;
            let (mut a, mut b) = match self.price_transform {
                PriceTransform::InvertLeg1 { a, b } | PriceTransform::InvertLeg2 { a, b } => {
                    (a, b)
                }
                PriceTransform::None => (1.0, 0.0),
            };
            override_parsed("TRANSFORM_A", &mut a)?;
            override_parsed("TRANSFORM_B", &mut b)?;
            self.price_transform = build_transform(kind, a, b);
        }
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ModelError> {
        let invalid = |msg: &str| Err(ModelError::InvalidConfig(msg.to_string()));
        if !self.entry_z.is_finite() || self.entry_z <= 0.0 {
            return invalid("entry_z_score must be positive");
        }
        if self.exit_z >= self.entry_z {
            return invalid("exit_z_score must be below entry_z_score");
        }
        for (name, d) in [
            ("delta", self.delta),
            ("delta_min", self.delta_min),
            ("delta_max", self.delta_max),
        ] {
            if !(0.0..1.0).contains(&d) || d == 0.0 {
                return Err(ModelError::InvalidConfig(format!(
                    "{} must lie in (0, 1), got {}",
                    name, d
                )));
            }
        }
        if self.delta_min > self.delta_max || self.ve_min > self.ve_max {
            return invalid("grid minimum exceeds maximum");
        }
        if self.ve.is_nan() || self.ve <= 0.0 || self.ve_min.is_nan() || self.ve_min <= 0.0 {
            return invalid("observation noise must be positive");
        }
        if self.delta_steps == 0 || self.ve_steps == 0 {
            return invalid("grid steps must be at least 1");
        }
        if self.tracking_window < 2 {
            return invalid("tracking_window must be at least 2");
        }
        if self.lookback == 0 {
            return invalid("lookback must be at least 1");
        }
        if self.virtual_fee < 0.0 {
            return invalid("virtual_fee must not be negative");
        }
        if self.usage_width_pct.is_nan() || self.usage_width_pct <= 0.0 {
            return invalid("usage_width_pct must be positive");
        }
        Ok(())
    }

    pub fn holding_limit(&self) -> Option<u32> {
        if self.holding_enabled {
            Some(self.holding_days)
        } else {
            None
        }
    }

    /// Thresholds and gating for the real position traded on the published
    /// estimate.
    pub fn strategy(&self) -> SimpleStrategy {
        SimpleStrategy {
            model_id: 0,
            allow_long: self.allow_long,
            allow_short: self.allow_short,
            entry_threshold: self.entry_z,
            exit_threshold: self.exit_z,
            holding_days: self.holding_limit(),
        }
    }

    pub fn kalman_params(&self) -> KalmanParams {
        KalmanParams {
            delta: self.delta,
            ve: self.ve,
            lookback: self.lookback,
        }
    }

    pub fn ensemble_params(&self) -> EnsembleParams {
        EnsembleParams {
            lookback: self.lookback,
            warmup: self.warmup_ticks,
            entry_threshold: self.entry_z,
            exit_threshold: self.exit_z,
            allow_long: self.allow_long,
            allow_short: self.allow_short,
            holding_days: self.holding_limit(),
            fee: self.virtual_fee,
            tracking_window: self.tracking_window,
            usage_target_pct: self.usage_target_pct,
            usage_width_pct: self.usage_width_pct,
            tracker_kind: self.tracker_kind,
            residual_filter: self.residual_filter,
            inhibit_threshold: self.inhibit_threshold,
            kill_on_inhibit: self.kill_on_inhibit,
        }
    }

    pub fn grid_params(&self) -> GridParams {
        GridParams {
            ensemble: self.ensemble_params(),
            delta_min: self.delta_min,
            delta_max: self.delta_max,
            delta_steps: self.delta_steps,
            ve_min: self.ve_min,
            ve_max: self.ve_max,
            ve_steps: self.ve_steps,
        }
    }

    pub fn auto_params(&self) -> AutoParams {
        AutoParams {
            ensemble: self.ensemble_params(),
            delta_min: self.delta_min,
            delta_max: self.delta_max,
            delta_steps: self.delta_steps,
            ve: self.ve,
        }
    }
}

fn build_transform(kind: TransformKind, a: f64, b: f64) -> PriceTransform {
    match kind {
        TransformKind::None => PriceTransform::None,
        TransformKind::InvertLeg1 => PriceTransform::InvertLeg1 { a, b },
        TransformKind::InvertLeg2 => PriceTransform::InvertLeg2 { a, b },
    }
}

trait EnvValue: Sized {
    fn parse_env(raw: &str) -> std::result::Result<Self, ConfigError>;
}

impl EnvValue for f64 {
    fn parse_env(raw: &str) -> std::result::Result<Self, ConfigError> {
        Ok(raw.parse::<f64>()?)
    }
}

impl EnvValue for usize {
    fn parse_env(raw: &str) -> std::result::Result<Self, ConfigError> {
        Ok(raw.parse::<usize>()?)
    }
}

impl EnvValue for u32 {
    fn parse_env(raw: &str) -> std::result::Result<Self, ConfigError> {
        Ok(raw.parse::<u32>()?)
    }
}

macro_rules! env_value_from_str {
    ($($t:ty),*) => {
        $(impl EnvValue for $t {
            fn parse_env(raw: &str) -> std::result::Result<Self, ConfigError> {
                raw.parse::<$t>().map_err(|_| ConfigError::InvalidValue {
                    key: stringify!($t).to_string(),
                    value: raw.to_string(),
                })
            }
        })*
    };
}

env_value_from_str!(
    ModelKind,
    EntryMode,
    SizingMode,
    TransformKind,
    TrackerKind,
    ResidualFilter
);

fn parse_value<T: EnvValue>(key: &str, raw: &str) -> std::result::Result<T, ConfigError> {
    T::parse_env(raw.trim()).map_err(|e| match e {
        ConfigError::InvalidValue { value, .. } => ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        },
        other => other,
    })
}

fn override_parsed<T: EnvValue>(key: &str, slot: &mut T) -> std::result::Result<(), ConfigError> {
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            *slot = parse_value(key, &value)?;
        }
    }
    Ok(())
}

fn override_bool(key: &str, slot: &mut bool) {
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            *slot = value.to_lowercase() == "true";
        }
    }
}
