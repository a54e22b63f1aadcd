//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::DEFAULT_SALVAGE_ATTEMPTS;
use crate::project::{Inputs, APPROVAL_THRESHOLD};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// External model command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Program that reads `{"instructions","input"}` JSON on stdin
    #[serde(default = "default_model_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Knobs for the generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// `userText` longer than this (trimmed) marks a chapter approved
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: usize,

    /// How much of a chapter's user edit is shown to the model on regenerate
    #[serde(default = "default_user_text_preview_chars")]
    pub user_text_preview_chars: usize,

    #[serde(default = "default_salvage_max_attempts")]
    pub salvage_max_attempts: usize,

    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

/// Seed values for new project inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_total_chapters")]
    pub total_chapters: u32,
    #[serde(default = "default_target_words")]
    pub target_words: u32,
    #[serde(default = "default_min_words")]
    pub min_words: u32,
    #[serde(default = "default_max_words")]
    pub max_words: u32,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/storyloom/storyloom.db".to_string()
}

fn default_model_command() -> String {
    "llm-json".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_approval_threshold() -> usize {
    APPROVAL_THRESHOLD
}

fn default_user_text_preview_chars() -> usize {
    2000
}

fn default_salvage_max_attempts() -> usize {
    DEFAULT_SALVAGE_ATTEMPTS
}

fn default_list_limit() -> usize {
    20
}

fn default_total_chapters() -> u32 {
    Inputs::default().total_chapters
}

fn default_target_words() -> u32 {
    Inputs::default().target_words
}

fn default_min_words() -> u32 {
    Inputs::default().min_words
}

fn default_max_words() -> u32 {
    Inputs::default().max_words
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: default_model_command(),
            args: vec![],
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            approval_threshold: default_approval_threshold(),
            user_text_preview_chars: default_user_text_preview_chars(),
            salvage_max_attempts: default_salvage_max_attempts(),
            list_limit: default_list_limit(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            total_chapters: default_total_chapters(),
            target_words: default_target_words(),
            min_words: default_min_words(),
            max_words: default_max_words(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./storyloom.yaml (current directory)
    /// 3. <config dir>/storyloom/storyloom.yaml
    pub fn load(path: &str) -> Result<Self> {
        let mut search_paths = vec![
            PathBuf::from(shellexpand::tilde(path).to_string()),
            PathBuf::from("storyloom.yaml"),
        ];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("storyloom").join("storyloom.yaml"));
        }

        for search_path in &search_paths {
            if search_path.exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    /// Inputs for a new project, word counts and chapter count pre-filled
    pub fn default_inputs(&self) -> Inputs {
        Inputs {
            total_chapters: self.defaults.total_chapters,
            target_words: self.defaults.target_words,
            min_words: self.defaults.min_words,
            max_words: self.defaults.max_words,
            ..Inputs::default()
        }
    }
}
