//! Cache of the most recent settings advertised by the control source

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Settings message categories sent by the control source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsCategory {
    /// `translate_settings`: the general settings object (current language etc.)
    General,
    /// `installed_languages`: languages the translator has installed
    InstalledLanguages,
    /// `whisper_languages`: languages the speech model can recognise
    WhisperLanguages,
}

impl SettingsCategory {
    pub fn from_message_type(message_type: &str) -> Option<Self> {
        match message_type {
            "translate_settings" => Some(Self::General),
            "installed_languages" => Some(Self::InstalledLanguages),
            "whisper_languages" => Some(Self::WhisperLanguages),
            _ => None,
        }
    }
}

/// Passive cache, replaced per category. General settings are flattened into
/// the top level so subscribers read e.g. `current_language` directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSettings {
    #[serde(flatten)]
    pub general: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_languages: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_languages: Option<Value>,
}

impl ControlSettings {
    pub fn is_empty(&self) -> bool {
        self.general.is_empty()
            && self.installed_languages.is_none()
            && self.whisper_languages.is_none()
    }

    /// Replace one category wholesale. Returns false when `data` has the
    /// wrong shape for the category and the cache was left alone.
    pub fn apply(&mut self, category: SettingsCategory, data: Value) -> bool {
        match category {
            SettingsCategory::General => match data {
                Value::Object(mut map) => {
                    // These two keys belong to their own categories
                    map.remove("installed_languages");
                    map.remove("whisper_languages");
                    self.general = map;
                    true
                }
                _ => false,
            },
            SettingsCategory::InstalledLanguages => {
                if data.is_null() {
                    return false;
                }
                self.installed_languages = Some(data);
                true
            }
            SettingsCategory::WhisperLanguages => {
                if data.is_null() {
                    return false;
                }
                self.whisper_languages = Some(data);
                true
            }
        }
    }
}
