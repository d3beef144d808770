//! Bottom-speed settings: the host option definitions and the per-pass
//! configuration snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BottomSpeedError, Result};
use crate::gcode::feed_rate_token;
use crate::host::GlobalStack;

/// Host key of the enable flag.
pub const ENABLE_KEY: &str = "fbi_enable";
/// Host key of the initial-layer infill speed.
pub const FIRST_LAYER_INFILL_SPEED_KEY: &str = "fbi0_speed";
/// Host key of the initial-layer wall speed.
pub const FIRST_LAYER_WALL_SPEED_KEY: &str = "wbi0_speed";
/// Host key of the bottom-layer infill speed.
pub const BOTTOM_INFILL_SPEED_KEY: &str = "fbi_speed";
/// Settings category the definitions are attached to.
pub const SPEED_CATEGORY: &str = "speed";

/// Lowest accepted positive speed (mm/s).
pub const MIN_SPEED: f64 = 10.0;
/// Speeds above this are accepted with a warning (mm/s).
pub const MAX_SPEED_WARNING: f64 = 200.0;
/// Default speed for all three roles (mm/s).
pub const DEFAULT_SPEED: f64 = 50.0;

/// Configuration snapshot read once per write.
///
/// A speed `<= 0` disables rewriting for that role only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottomSpeedSettings {
    /// Master switch.
    #[serde(alias = "fbi_enable")]
    pub enabled: bool,
    /// Skin speed on the initial layer (mm/s).
    #[serde(alias = "fbi0_speed")]
    pub first_layer_infill_speed: f64,
    /// Wall speed on the initial layer (mm/s).
    #[serde(alias = "wbi0_speed")]
    pub first_layer_wall_speed: f64,
    /// Skin speed on the first bottom layer above the initial one (mm/s).
    #[serde(alias = "fbi_speed")]
    pub bottom_infill_speed: f64,
}

impl Default for BottomSpeedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            first_layer_infill_speed: DEFAULT_SPEED,
            first_layer_wall_speed: DEFAULT_SPEED,
            bottom_infill_speed: DEFAULT_SPEED,
        }
    }
}

impl BottomSpeedSettings {
    /// Read the four settings from the host's global stack.
    ///
    /// A missing enable flag reads as disabled; a missing speed disables
    /// its role.
    pub fn from_stack<S: GlobalStack + ?Sized>(stack: &S) -> Self {
        let speed = |key: &str| {
            stack
                .property(key)
                .and_then(SettingValue::as_f64)
                .unwrap_or(0.0)
        };
        Self {
            enabled: stack
                .property(ENABLE_KEY)
                .and_then(SettingValue::as_bool)
                .unwrap_or(false),
            first_layer_infill_speed: speed(FIRST_LAYER_INFILL_SPEED_KEY),
            first_layer_wall_speed: speed(FIRST_LAYER_WALL_SPEED_KEY),
            bottom_infill_speed: speed(BOTTOM_INFILL_SPEED_KEY),
        }
    }

    /// Parse settings from TOML. Absent fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        for (key, speed) in self.speeds() {
            if !speed.is_finite() {
                return Err(BottomSpeedError::InvalidSettings(format!(
                    "{key} must be a finite number"
                )));
            }
            if speed > 0.0 && speed < MIN_SPEED {
                return Err(BottomSpeedError::InvalidSettings(format!(
                    "{key} must be at least {MIN_SPEED} mm/s (or <= 0 to disable)"
                )));
            }
            if speed > MAX_SPEED_WARNING {
                log::warn!("{key} = {speed} mm/s is above {MAX_SPEED_WARNING} mm/s");
            }
        }
        Ok(())
    }

    fn speeds(&self) -> [(&'static str, f64); 3] {
        [
            (FIRST_LAYER_INFILL_SPEED_KEY, self.first_layer_infill_speed),
            (FIRST_LAYER_WALL_SPEED_KEY, self.first_layer_wall_speed),
            (BOTTOM_INFILL_SPEED_KEY, self.bottom_infill_speed),
        ]
    }

    /// Feed-rate token for initial-layer skin, if that role is enabled.
    pub fn first_layer_infill_feed(&self) -> Option<String> {
        role_feed(self.first_layer_infill_speed)
    }

    /// Feed-rate token for initial-layer walls, if that role is enabled.
    pub fn first_layer_wall_feed(&self) -> Option<String> {
        role_feed(self.first_layer_wall_speed)
    }

    /// Feed-rate token for bottom-layer skin, if that role is enabled.
    pub fn bottom_infill_feed(&self) -> Option<String> {
        role_feed(self.bottom_infill_speed)
    }
}

fn role_feed(speed: f64) -> Option<String> {
    (speed > 0.0).then(|| feed_rate_token(speed))
}

/// Value type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    /// Checkbox.
    Bool,
    /// Real number.
    Float,
}

/// A setting value as stored on a settings stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Float(f64),
}

impl SettingValue {
    /// The value as a bool, if it is one.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            SettingValue::Bool(value) => Some(value),
            SettingValue::Float(_) => None,
        }
    }

    /// The value as a number, if it is one.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            SettingValue::Float(value) => Some(value),
            SettingValue::Bool(_) => None,
        }
    }
}

/// One option definition registered with the host's settings system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefinition {
    /// Host key; serialized as the enclosing map key.
    #[serde(skip)]
    pub key: String,
    /// Display label.
    pub label: String,
    /// Tooltip text.
    pub description: String,
    /// Value type.
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    /// Display unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Default value.
    pub default_value: SettingValue,
    /// Hard minimum, as a host expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_value: Option<String>,
    /// Soft maximum, as a host expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_value_warning: Option<String>,
    /// Visibility expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<String>,
    /// Can be overridden per mesh.
    pub settable_per_mesh: bool,
    /// Can be overridden per extruder.
    pub settable_per_extruder: bool,
    /// Can be overridden per mesh group.
    pub settable_per_meshgroup: bool,
}

impl SettingDefinition {
    fn speed(key: &str, label: &str) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            description: format!("{label}."),
            setting_type: SettingType::Float,
            unit: Some("mm/s".into()),
            default_value: SettingValue::Float(DEFAULT_SPEED),
            minimum_value: Some(format!("{MIN_SPEED}")),
            maximum_value_warning: Some(format!("{MAX_SPEED_WARNING}")),
            enabled: Some(ENABLE_KEY.into()),
            settable_per_mesh: false,
            settable_per_extruder: false,
            settable_per_meshgroup: false,
        }
    }
}

/// The four option definitions, in registration order.
pub fn setting_definitions() -> Vec<SettingDefinition> {
    vec![
        SettingDefinition {
            key: ENABLE_KEY.into(),
            label: "Enable Bottom Layers Speed Adjust".into(),
            description: "Enable Bottom Layers Speed Adjustments".into(),
            setting_type: SettingType::Bool,
            unit: None,
            default_value: SettingValue::Bool(false),
            minimum_value: None,
            maximum_value_warning: None,
            enabled: None,
            settable_per_mesh: false,
            settable_per_extruder: false,
            settable_per_meshgroup: false,
        },
        SettingDefinition::speed(FIRST_LAYER_INFILL_SPEED_KEY, "Initial Layer Infill Speed"),
        SettingDefinition::speed(FIRST_LAYER_WALL_SPEED_KEY, "Initial Layer Wall Speed"),
        SettingDefinition::speed(BOTTOM_INFILL_SPEED_KEY, "Bottom Layers Infill Speed"),
    ]
}

/// The definitions as a JSON object keyed by host key, in the host's
/// definition-file layout.
pub fn definitions_json() -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for definition in setting_definitions() {
        let value = serde_json::to_value(&definition).unwrap_or(serde_json::Value::Null);
        map.insert(definition.key, value);
    }
    serde_json::Value::Object(map)
}

/// In-memory settings stack seeded with the definitions' defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileStack {
    values: BTreeMap<String, SettingValue>,
}

impl Default for ProfileStack {
    fn default() -> Self {
        Self {
            values: setting_definitions()
                .into_iter()
                .map(|definition| (definition.key, definition.default_value))
                .collect(),
        }
    }
}

impl ProfileStack {
    /// Stack holding exactly the values of `settings`.
    pub fn from_settings(settings: &BottomSpeedSettings) -> Self {
        let mut stack = Self::default();
        stack.apply(settings);
        stack
    }

    /// Set one value.
    pub fn set(&mut self, key: impl Into<String>, value: SettingValue) {
        self.values.insert(key.into(), value);
    }

    /// Remove one value.
    pub fn unset(&mut self, key: &str) -> Option<SettingValue> {
        self.values.remove(key)
    }

    /// Overwrite all four values from a snapshot.
    pub fn apply(&mut self, settings: &BottomSpeedSettings) {
        self.set(ENABLE_KEY, SettingValue::Bool(settings.enabled));
        for (key, speed) in settings.speeds() {
            self.set(key, SettingValue::Float(speed));
        }
    }
}

impl GlobalStack for ProfileStack {
    fn property(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let settings = BottomSpeedSettings::default();
        assert!(!settings.enabled);
        assert_relative_eq!(settings.first_layer_infill_speed, 50.0);
        assert_relative_eq!(settings.first_layer_wall_speed, 50.0);
        assert_relative_eq!(settings.bottom_infill_speed, 50.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_role_feeds() {
        let settings = BottomSpeedSettings {
            enabled: true,
            first_layer_infill_speed: 50.0,
            first_layer_wall_speed: 0.0,
            bottom_infill_speed: -1.0,
        };
        assert_eq!(settings.first_layer_infill_feed().as_deref(), Some("3000"));
        assert_eq!(settings.first_layer_wall_feed(), None);
        assert_eq!(settings.bottom_infill_feed(), None);
    }

    #[test]
    fn test_validate() {
        let mut settings = BottomSpeedSettings {
            enabled: true,
            ..Default::default()
        };
        settings.first_layer_wall_speed = 5.0;
        assert!(settings.validate().is_err());

        settings.first_layer_wall_speed = 0.0;
        assert!(settings.validate().is_ok());

        settings.bottom_infill_speed = 250.0;
        assert!(settings.validate().is_ok());

        settings.first_layer_infill_speed = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let settings = BottomSpeedSettings::from_toml_str(
            "enabled = true\nfirst_layer_infill_speed = 30.0\nfbi_speed = 40.0\n",
        )
        .unwrap();
        assert!(settings.enabled);
        assert_relative_eq!(settings.first_layer_infill_speed, 30.0);
        assert_relative_eq!(settings.first_layer_wall_speed, DEFAULT_SPEED);
        assert_relative_eq!(settings.bottom_infill_speed, 40.0);

        assert!(BottomSpeedSettings::from_toml_str("enabled = 3").is_err());
    }

    #[test]
    fn test_definitions() {
        let definitions = setting_definitions();
        let keys: Vec<_> = definitions.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(
            keys,
            [
                ENABLE_KEY,
                FIRST_LAYER_INFILL_SPEED_KEY,
                FIRST_LAYER_WALL_SPEED_KEY,
                BOTTOM_INFILL_SPEED_KEY
            ]
        );
        for definition in &definitions[1..] {
            assert_eq!(definition.setting_type, SettingType::Float);
            assert_eq!(definition.minimum_value.as_deref(), Some("10"));
            assert_eq!(definition.maximum_value_warning.as_deref(), Some("200"));
            assert_eq!(definition.enabled.as_deref(), Some(ENABLE_KEY));
            assert!(!definition.settable_per_mesh);
        }
    }

    #[test]
    fn test_definitions_json() {
        let json = definitions_json();
        assert_eq!(json["fbi_enable"]["type"], "bool");
        assert_eq!(json["fbi_enable"]["default_value"], false);
        assert_eq!(json["fbi0_speed"]["unit"], "mm/s");
        assert_eq!(json["fbi_speed"]["default_value"], 50.0);
        assert!(json["fbi_enable"].get("unit").is_none());
    }

    #[test]
    fn test_stack_round_trip() {
        let settings = BottomSpeedSettings {
            enabled: true,
            first_layer_infill_speed: 20.0,
            first_layer_wall_speed: 25.0,
            bottom_infill_speed: 30.0,
        };
        let stack = ProfileStack::from_settings(&settings);
        assert_eq!(BottomSpeedSettings::from_stack(&stack), settings);
    }

    #[test]
    fn test_stack_missing_values() {
        let mut stack = ProfileStack::default();
        stack.set(ENABLE_KEY, SettingValue::Bool(true));
        stack.unset(FIRST_LAYER_WALL_SPEED_KEY);
        let settings = BottomSpeedSettings::from_stack(&stack);
        assert!(settings.enabled);
        assert_eq!(settings.first_layer_wall_feed(), None);
        assert_eq!(settings.first_layer_infill_feed().as_deref(), Some("3000"));

        stack.unset(ENABLE_KEY);
        assert!(!BottomSpeedSettings::from_stack(&stack).enabled);
    }
}
