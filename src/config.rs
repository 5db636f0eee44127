use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "bill_parser.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_dir: String,
    pub output_path: String,
    pub llm: LlmSection,
    pub ocr: OcrSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: "bills".to_string(),
            output_path: "output/results.csv".to_string(),
            llm: LlmSection::default(),
            ocr: OcrSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI-compatible base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub dpi: u32,
    /// Tesseract language spec, e.g. `eng+afr`.
    pub languages: String,
    pub pdftoppm: String,
    pub tesseract: String,
}

impl Default for OcrSection {
    fn default() -> Self {
        Self {
            dpi: 300,
            languages: "eng+afr".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            tesseract: "tesseract".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if path.exists() {
            info!(path = %path.display(), "Loading config");
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}
