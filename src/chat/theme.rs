// src/chat/theme.rs
//! Theme settings
//!
//! Stored as one record under `aura-chat-theme`. Loading is lenient: any
//! field whose value is not a known option falls back to its default while
//! the other fields are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{keys, read_json, write_json, KeyValueStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePreset {
    pub name: &'static str,
    pub color: &'static str,
}

pub const THEME_PRESETS: [ThemePreset; 5] = [
    ThemePreset { name: "Aura Green", color: "#34D399" },
    ThemePreset { name: "Ocean Blue", color: "#3B82F6" },
    ThemePreset { name: "Sunset Orange", color: "#F97316" },
    ThemePreset { name: "Royal Purple", color: "#8B5CF6" },
    ThemePreset { name: "Hot Pink", color: "#EC4899" },
];

/// Palette name selecting `custom_primary_color`
pub const CUSTOM_THEME: &str = "custom";

pub const FONT_OPTIONS: [&str; 4] = ["Inter", "Roboto", "Lora", "Roboto Mono"];
pub const BACKGROUND_OPTIONS: [&str; 4] = ["Default", "Doodles", "Polka", "Geometry"];

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})$").unwrap());

/// Parse `#RRGGBB` into its components
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let caps = HEX_COLOR.captures(value.trim())?;
    let channel = |i: usize| u8::from_str_radix(&caps[i], 16).ok();
    Some((channel(1)?, channel(2)?, channel(3)?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSettings {
    pub mode: ThemeMode,
    pub theme_name: String,
    pub custom_primary_color: String,
    pub font_family: String,
    pub chat_background: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        ThemeSettings {
            mode: ThemeMode::Dark,
            theme_name: THEME_PRESETS[0].name.to_string(),
            custom_primary_color: THEME_PRESETS[0].color.to_string(),
            font_family: FONT_OPTIONS[0].to_string(),
            chat_background: BACKGROUND_OPTIONS[0].to_string(),
        }
    }
}

fn next_in<'a>(options: &[&'a str], current: &str) -> &'a str {
    let index = options.iter().position(|o| *o == current).map_or(0, |i| (i + 1) % options.len());
    options[index]
}

impl ThemeSettings {
    /// Build settings from a stored JSON value, field by field
    pub fn from_value(value: &Value) -> Self {
        let defaults = ThemeSettings::default();
        let field = |name: &str| value.get(name).and_then(Value::as_str);

        let theme_name = field("themeName")
            .filter(|name| *name == CUSTOM_THEME || THEME_PRESETS.iter().any(|p| p.name == *name))
            .map(str::to_string)
            .unwrap_or(defaults.theme_name);
        let custom_primary_color = field("customPrimaryColor")
            .filter(|color| parse_hex_color(color).is_some())
            .map(str::to_string)
            .unwrap_or(defaults.custom_primary_color);
        let font_family = field("fontFamily")
            .filter(|font| FONT_OPTIONS.contains(font))
            .map(str::to_string)
            .unwrap_or(defaults.font_family);
        let chat_background = field("chatBackground")
            .filter(|bg| BACKGROUND_OPTIONS.contains(bg))
            .map(str::to_string)
            .unwrap_or(defaults.chat_background);

        ThemeSettings {
            mode: field("mode").and_then(ThemeMode::parse).unwrap_or(defaults.mode),
            theme_name,
            custom_primary_color,
            font_family,
            chat_background,
        }
    }

    pub fn load(store: &dyn KeyValueStore) -> Self {
        read_json::<Value>(store, keys::THEME)
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        write_json(store, keys::THEME, self)
    }

    pub fn is_custom(&self) -> bool {
        self.theme_name == CUSTOM_THEME
    }

    /// Active primary colour as `#RRGGBB`
    pub fn primary_color(&self) -> &str {
        if self.is_custom() {
            return &self.custom_primary_color;
        }
        THEME_PRESETS
            .iter()
            .find(|p| p.name == self.theme_name)
            .unwrap_or(&THEME_PRESETS[0])
            .color
    }

    /// Switch to the custom palette. Rejects anything but `#RRGGBB`.
    pub fn set_custom_color(&mut self, color: &str) -> bool {
        let color = color.trim();
        if parse_hex_color(color).is_none() {
            return false;
        }
        self.custom_primary_color = color.to_uppercase();
        self.theme_name = CUSTOM_THEME.to_string();
        true
    }

    /// Cycle through the presets, then the custom palette
    pub fn cycle_palette(&mut self) {
        let mut names: Vec<&str> = THEME_PRESETS.iter().map(|p| p.name).collect();
        names.push(CUSTOM_THEME);
        self.theme_name = next_in(&names, &self.theme_name).to_string();
    }

    pub fn cycle_font(&mut self) {
        self.font_family = next_in(&FONT_OPTIONS, &self.font_family).to_string();
    }

    pub fn cycle_background(&mut self) {
        self.chat_background = next_in(&BACKGROUND_OPTIONS, &self.chat_background).to_string();
    }
}
