//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `BUBU_WORK_DIR`, `BUBU_LOG_LEVEL` and `BUBU_BIND` overrides.
//! When no file exists a hardcoded default is used.  The LLM API key comes
//! from `LLM_API_KEY` only.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::breakdown::PromptStyle;
use crate::error::AppError;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:5001`.
    pub bind: String,
    /// Value for `Access-Control-Allow-Origin`; `*` allows any origin.
    pub cors_origin: String,
}

/// Token lifetimes.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Directory holding the token signing keypair.  Defaults to `work_dir/keys`.
    pub key_dir: Option<PathBuf>,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

/// Gemini provider configuration (`[llm.gemini]`).
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL up to and including the API version, e.g. `.../v1beta`.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"dummy"`, `"openai"` or `"gemini"`.
    pub provider: String,
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
    /// Canned reply for the dummy provider.  `None` echoes the prompt.
    pub dummy_reply: Option<String>,
}

/// Subtask generation settings.
#[derive(Debug, Clone)]
pub struct BreakdownConfig {
    pub prompts_dir: PathBuf,
    pub default_style: PromptStyle,
    /// Safety margin added to summed subtask estimates, in percent.
    pub time_buffer_percent: u32,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Directory for the database and keys.
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Optional log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Database file name relative to `work_dir`, or `:memory:`.
    pub db_file: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub breakdown: BreakdownConfig,
    /// API key from `LLM_API_KEY` env var.  Never sourced from TOML.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Absolute path of the SQLite database, or `None` for an in-memory store.
    pub fn db_path(&self) -> Option<PathBuf> {
        if self.db_file == ":memory:" {
            None
        } else {
            Some(self.work_dir.join(&self.db_file))
        }
    }

    pub fn key_dir(&self) -> PathBuf {
        self.auth
            .key_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("keys"))
    }
}

impl Default for Config {
    /// Hardcoded minimal default: dummy LLM, in-memory store.
    fn default() -> Self {
        let mut raw = RawConfig::default();
        raw.app.db_file = ":memory:".to_string();
        resolve(raw, None, None, None, None)
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    auth: RawAuth,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    breakdown: RawBreakdown,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default = "default_db_file")]
    db_file: String,
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
            db_file: default_db_file(),
        }
    }
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_cors_origin")]
    cors_origin: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind(), cors_origin: default_cors_origin() }
    }
}

#[derive(Deserialize)]
struct RawAuth {
    #[serde(default = "default_access_ttl")]
    access_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl")]
    refresh_ttl_days: i64,
    #[serde(default)]
    key_dir: Option<String>,
}

impl Default for RawAuth {
    fn default() -> Self {
        Self {
            access_ttl_minutes: default_access_ttl(),
            refresh_ttl_days: default_refresh_ttl(),
            key_dir: None,
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAi,
    #[serde(default)]
    gemini: RawGemini,
    #[serde(default)]
    dummy_reply: Option<String>,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAi::default(),
            gemini: RawGemini::default(),
            dummy_reply: None,
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawGemini {
    #[serde(default = "default_gemini_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGemini {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawBreakdown {
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    #[serde(default = "default_prompt_style")]
    default_prompt: String,
    #[serde(default = "default_time_buffer")]
    time_buffer_percent: u32,
}

impl Default for RawBreakdown {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            default_prompt: default_prompt_style(),
            time_buffer_percent: default_time_buffer(),
        }
    }
}

fn default_app_name() -> String { "bubu-do".to_string() }
fn default_work_dir() -> String { "~/.bubu-do".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_db_file() -> String { "bubu.db".to_string() }
fn default_bind() -> String { "127.0.0.1:5001".to_string() }
fn default_cors_origin() -> String { "*".to_string() }
fn default_access_ttl() -> i64 { 15 }
fn default_refresh_ttl() -> i64 { 7 }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_gemini_api_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_gemini_model() -> String { "gemini-1.5-flash".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 1000 }
fn default_timeout_seconds() -> u64 { 60 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_prompt_style() -> String { "A".to_string() }
fn default_time_buffer() -> u32 { 20 }

const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TTL_DAYS: i64 = 365;

// ── loading ───────────────────────────────────────────────────────────────────

/// Load config from `config/default.toml` (or the hardcoded default when the
/// file is absent), then apply env-var overrides.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("BUBU_WORK_DIR").ok();
    let log_level_override = env::var("BUBU_LOG_LEVEL").ok();
    let bind_override = env::var("BUBU_BIND").ok();
    let api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty());

    let path = match config_path {
        Some(p) => Path::new(p).to_path_buf(),
        None => {
            let default_path = PathBuf::from("config/default.toml");
            if !default_path.exists() {
                return Ok(resolve(
                    RawConfig::default(),
                    work_dir_override.as_deref(),
                    log_level_override.as_deref(),
                    bind_override.as_deref(),
                    api_key,
                ));
            }
            default_path
        }
    };

    let mut cfg = load_from(
        &path,
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
        bind_override.as_deref(),
    )?;
    cfg.llm_api_key = api_key;
    Ok(cfg)
}

/// Internal loader; accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
    bind_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if !(1..=MAX_ACCESS_TTL_MINUTES).contains(&parsed.auth.access_ttl_minutes) {
        return Err(AppError::Config(format!(
            "auth.access_ttl_minutes must be between 1 and {MAX_ACCESS_TTL_MINUTES}"
        )));
    }
    if !(1..=MAX_REFRESH_TTL_DAYS).contains(&parsed.auth.refresh_ttl_days) {
        return Err(AppError::Config(format!(
            "auth.refresh_ttl_days must be between 1 and {MAX_REFRESH_TTL_DAYS}"
        )));
    }
    if PromptStyle::parse(&parsed.breakdown.default_prompt).is_none() {
        return Err(AppError::Config(format!(
            "unknown breakdown.default_prompt '{}' (expected A or B)",
            parsed.breakdown.default_prompt
        )));
    }

    Ok(resolve(parsed, work_dir_override, log_level_override, bind_override, None))
}

fn resolve(
    raw: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
    bind_override: Option<&str>,
    llm_api_key: Option<String>,
) -> Config {
    let work_dir = expand_home(work_dir_override.unwrap_or(&raw.app.work_dir));
    let log_level = log_level_override.unwrap_or(&raw.app.log_level).to_string();
    let bind = bind_override.unwrap_or(&raw.server.bind).to_string();
    let log_file = raw.app.log_file.map(|p| expand_home(&p));

    Config {
        app_name: raw.app.name,
        work_dir,
        log_level,
        log_file,
        db_file: raw.app.db_file,
        server: ServerConfig { bind, cors_origin: raw.server.cors_origin },
        auth: AuthConfig {
            access_ttl_minutes: raw.auth.access_ttl_minutes,
            refresh_ttl_days: raw.auth.refresh_ttl_days,
            key_dir: raw.auth.key_dir.map(|d| expand_home(&d)),
        },
        llm: LlmConfig {
            provider: raw.llm.provider,
            openai: OpenAiConfig {
                api_base_url: raw.llm.openai.api_base_url,
                model: raw.llm.openai.model,
                temperature: raw.llm.openai.temperature,
                max_tokens: raw.llm.openai.max_tokens,
                timeout_seconds: raw.llm.openai.timeout_seconds,
            },
            gemini: GeminiConfig {
                api_base_url: raw.llm.gemini.api_base_url,
                model: raw.llm.gemini.model,
                temperature: raw.llm.gemini.temperature,
                timeout_seconds: raw.llm.gemini.timeout_seconds,
            },
            dummy_reply: raw.llm.dummy_reply,
        },
        breakdown: BreakdownConfig {
            prompts_dir: PathBuf::from(raw.breakdown.prompts_dir),
            default_style: PromptStyle::parse(&raw.breakdown.default_prompt)
                .unwrap_or(PromptStyle::A),
            time_buffer_percent: raw.breakdown.time_buffer_percent,
        },
        llm_api_key,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
name = "test-app"
work_dir = "~/.bubu-test"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.app_name, "test-app");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.server.bind, "127.0.0.1:5001");
        assert_eq!(cfg.auth.access_ttl_minutes, 15);
        assert_eq!(cfg.auth.refresh_ttl_days, 7);
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.breakdown.default_style, PromptStyle::A);
        assert!(cfg.llm_api_key.is_none());
    }

    #[test]
    fn llm_sections_parse() {
        let f = write_toml(
            r#"
[llm]
default = "gemini"

[llm.gemini]
model = "gemini-pro"
temperature = 0.3
"#,
        );
        let cfg = load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.gemini.model, "gemini-pro");
        assert!((cfg.llm.gemini.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.llm.openai.model, "gpt-4o-mini");
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.bubu-do");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".bubu-do"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/bubu-override"), Some("debug"), Some("0.0.0.0:9000"))
            .unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/bubu-override"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn bad_prompt_style_rejected() {
        let f = write_toml("[breakdown]\ndefault_prompt = \"C\"\n");
        assert!(load_from(f.path(), None, None, None).is_err());
    }

    #[test]
    fn non_positive_ttl_rejected() {
        let f = write_toml("[auth]\naccess_ttl_minutes = 0\n");
        assert!(load_from(f.path(), None, None, None).is_err());
    }

    #[test]
    fn oversized_ttl_rejected() {
        let f = write_toml("[auth]\nrefresh_ttl_days = 9223372036854775807\n");
        let err = load_from(f.path(), None, None, None).unwrap_err();
        assert!(err.to_string().contains("refresh_ttl_days"));

        let f = write_toml("[auth]\naccess_ttl_minutes = 1441\n");
        assert!(load_from(f.path(), None, None, None).is_err());

        let f = write_toml("[auth]\naccess_ttl_minutes = 1440\nrefresh_ttl_days = 365\n");
        let cfg = load_from(f.path(), None, None, None).unwrap();
        assert_eq!(cfg.auth.refresh_ttl_days, 365);
    }

    #[test]
    fn default_is_in_memory() {
        let cfg = Config::default();
        assert!(cfg.db_path().is_none());
        assert_eq!(cfg.key_dir(), cfg.work_dir.join("keys"));
    }
}
