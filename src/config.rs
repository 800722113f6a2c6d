use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::display::boxed;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at generating filenames for academic papers from the text of the paper, following the format below exactly.

## Input
The text that follows this prompt is the character data extracted from the PDF of a paper.

## Output format
Output **only the filename**. Do not include any explanation or other text.

The filename must follow one of these formats:
- Two or more authors: "{first author's surname}"_"{second author's surname}"_"{publication year}"_"{title}".pdf
- One author: "{first author's surname}"_"{publication year}"_"{title}".pdf

## Extraction rules and priorities

1.  **"first author's surname", "second author's surname"**
    *   Identify the author names in the input text and take the first one or two authors that appear.
    *   Determine the surname of each extracted author. How to determine the surname is left to your judgement.
    *   If an author cannot be identified, use "Unknown" for that element.

2.  **"publication year"**
    *   Extract a four-digit year (e.g. 2023) from the input text as the publication year.
    *   If the year cannot be identified, use "Unknown" for that element.

3.  **"title"**
    *   Identify the title of the paper in the input text.
    *   **Japanese titles**: use the full extracted title as-is.
    *   **English titles**:
        *   Convert the title to CamelCase (PascalCase).
        *   Remove all spaces and capitalize the first letter of every word.
        *   Remove all symbols such as hyphens (-), colons (:) and commas (,).
    *   Whether a title is Japanese or English is left to your judgement.
    *   If the title cannot be identified, use "Unknown" for that element.

---
"#;

pub const DEFAULT_PAGE_COUNT: NonZeroU32 = match NonZeroU32::new(1) {
    Some(n) => n,
    None => unreachable!(),
};

const CONFIG_DIR_NAME: &str = "pdfnamer";
const CONFIG_FILE_NAME: &str = "settings.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no platform configuration directory available; pass --config")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// The persisted settings record, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "userApiKey", default, skip_serializing_if = "Option::is_none")]
    pub user_api_key: Option<String>,
    #[serde(rename = "systemPrompt", default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(rename = "pdfPageCount", default, skip_serializing_if = "Option::is_none")]
    pub pdf_page_count: Option<u32>,
}

/// Settings after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub page_count: NonZeroU32,
}

impl Settings {
    /// Applies the defaults table. `api_key_override` (flag or environment)
    /// wins over the stored key. Blank values count as unset.
    pub fn resolve(&self, api_key_override: Option<&str>) -> ResolvedConfig {
        let api_key = api_key_override
            .or(self.user_api_key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let system_prompt = self
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();

        let page_count = self
            .pdf_page_count
            .and_then(NonZeroU32::new)
            .unwrap_or(DEFAULT_PAGE_COUNT);

        ResolvedConfig {
            api_key,
            system_prompt,
            page_count,
        }
    }
}

/// Changes requested from the settings surface.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub page_count: Option<u32>,
}

impl SettingsUpdate {
    /// Merges the update into `current` and checks the result the same way
    /// the settings screen does before saving.
    pub fn apply(self, current: &Settings) -> Result<Settings, ConfigError> {
        let api_key = self
            .api_key
            .or_else(|| current.user_api_key.clone())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Invalid("An API key is required.".to_string()))?;

        let page_count = match self.page_count.or(current.pdf_page_count) {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "The number of PDF pages to read must be 1 or more.".to_string(),
                ))
            }
            other => other,
        };

        let system_prompt = match self.system_prompt {
            Some(prompt) => Some(prompt.trim().to_string()).filter(|p| !p.is_empty()),
            None => current.system_prompt.clone(),
        };

        Ok(Settings {
            user_api_key: Some(api_key),
            system_prompt,
            pdf_page_count: page_count,
        })
    }
}

/// Why the settings surface was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsReason {
    NoApiKey,
}

impl SettingsReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsReason::NoApiKey => "no_api_key",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "no_api_key" => Some(SettingsReason::NoApiKey),
            _ => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            SettingsReason::NoApiKey => {
                "No API key is configured. Save one with `pdfnamer config set --key <KEY>`."
            }
        }
    }
}

impl fmt::Display for SettingsReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-file backed settings store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/pdfnamer/settings.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means nothing has been saved yet.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file yet");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// Renders the settings screen, with a contextual message when it was opened
/// for a reason.
pub fn render_settings(
    config: &ResolvedConfig,
    store_path: &Path,
    reason: Option<SettingsReason>,
) -> String {
    let mut out = String::new();
    if let Some(reason) = reason {
        out.push_str(&boxed(&[reason.message()]));
        out.push('\n');
    }

    let key = config
        .api_key
        .as_deref()
        .map(mask_key)
        .unwrap_or_else(|| "(not set)".to_string());
    let prompt_source = if config.system_prompt == DEFAULT_SYSTEM_PROMPT {
        "default"
    } else {
        "custom"
    };

    out.push_str(&format!("Settings file: {}\n", store_path.display()));
    out.push_str(&format!("API key:       {}\n", key));
    out.push_str(&format!("PDF pages:     {}\n", config.page_count));
    out.push_str(&format!("Prompt ({}):\n", prompt_source));
    out.push_str(&config.system_prompt);
    if !config.system_prompt.ends_with('\n') {
        out.push('\n');
    }
    out
}
