mod api;
mod defaults;
mod sections;
mod validation;

use crate::api::vision::VisionSettings;
use crate::cli::Args;
use crate::history::{FilesystemStorage, DEFAULT_MAX_HISTORY_CHARS};
use crate::orchestrator::{EngineSettings, DEFAULT_MAX_LOOPS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use crate::tools::SystemBrowser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use api::ApiConfig;
pub use defaults::{normalize_endpoint, DEFAULT_API_ENDPOINT, EXAMPLE_CONFIG};
pub use sections::{BrowserConfig, EngineConfig, ModelConfig, SessionConfig, VisionConfig};
pub use validation::{expand_home, expand_with};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub model: String,
    pub system_prompt: String,
    pub stream_timeout: Option<u64>,
    pub max_loops: usize,
    pub max_history_chars: usize,
    pub verbose: bool,
    pub vision: VisionSettings,
    pub browser_opener: String,
    pub history_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl Config {
    pub fn from_env_and_args(args: &Args) -> Result<Self, String> {
        let file_config = FileConfig::load().map_err(|e| format!("{:#}", e))?;
        Ok(Self::resolve(args, &file_config, |name| env::var(name).ok()))
    }

    /// Precedence: CLI flag > environment > config file > default.
    pub fn resolve<F>(args: &Args, file: &FileConfig, env_var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let expand = |value: &String| expand_with(value, &env_var);
        let non_empty = |value: String| if value.trim().is_empty() { None } else { Some(value) };

        let api_key = env_var("DEEPSEEK_API_KEY")
            .or_else(|| file.api.key.as_ref().map(expand))
            .and_then(non_empty);

        let api_endpoint = args
            .api_endpoint
            .clone()
            .or_else(|| env_var("AI_API_ENDPOINT"))
            .or_else(|| file.api.endpoint.clone())
            .map(|endpoint| normalize_endpoint(&endpoint))
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());

        let model = args
            .model
            .clone()
            .or_else(|| env_var("AI_MODEL"))
            .or_else(|| file.model.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let system_prompt = env_var("AI_SYSTEM_PROMPT")
            .or_else(|| file.model.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let stream_timeout = env_var("AI_STREAM_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .or(file.api.stream_timeout);

        let max_loops = env_var("AI_MAX_LOOPS")
            .and_then(|s| s.parse::<usize>().ok())
            .or(file.engine.max_loops)
            .unwrap_or(DEFAULT_MAX_LOOPS)
            .max(1);

        let max_history_chars = env_var("AI_MAX_HISTORY_CHARS")
            .and_then(|s| s.parse::<usize>().ok())
            .or(file.engine.max_history_chars)
            .unwrap_or(DEFAULT_MAX_HISTORY_CHARS);

        let verbose = args.verbose
            || env_var("AI_VERBOSE")
                .and_then(|v| defaults::parse_bool(&v))
                .or(file.session.verbose)
                .unwrap_or(false);

        let defaults = VisionSettings::default();
        let vision = VisionSettings {
            openai_key: env_var("OPENAI_API_KEY")
                .or_else(|| file.vision.openai_key.as_ref().map(expand))
                .and_then(non_empty),
            google_key: env_var("GOOGLE_API_KEY")
                .or_else(|| file.vision.google_key.as_ref().map(expand))
                .and_then(non_empty),
            openai_endpoint: file
                .vision
                .openai_endpoint
                .clone()
                .unwrap_or(defaults.openai_endpoint),
            gemini_base_url: file
                .vision
                .gemini_base_url
                .clone()
                .unwrap_or(defaults.gemini_base_url),
            ..defaults
        };

        let browser_opener = file
            .browser
            .opener
            .clone()
            .unwrap_or_else(|| SystemBrowser::default_opener().to_string());

        let history_dir = file
            .session
            .history_dir
            .as_ref()
            .map(|dir| PathBuf::from(expand_home(&expand(dir))))
            .unwrap_or_else(FilesystemStorage::default_dir);

        Config {
            api_key,
            api_endpoint,
            model,
            system_prompt,
            stream_timeout,
            max_loops,
            max_history_chars,
            verbose,
            vision,
            browser_opener,
            history_dir,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            max_loops: self.max_loops,
        }
    }
}

impl FileConfig {
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(FileConfig::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config file: {}", path.display()))
        }
    }

    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".tabchat.yaml"),
            PathBuf::from(".tabchat.yml"),
            PathBuf::from(".tabchat.json"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let config_dir = home_dir.join(".config").join("tabchat");
            paths.push(config_dir.join("tabchat.yaml"));
            paths.push(config_dir.join("tabchat.yml"));
            paths.push(config_dir.join("tabchat.json"));
        }

        paths
    }

    /// Write the example config to `~/.config/tabchat/tabchat.yaml` unless one exists.
    pub fn init_user_config() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        let config_dir = home_dir.join(".config").join("tabchat");
        let path = config_dir.join("tabchat.yaml");
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        fs::write(&path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
