use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

use crate::util::RetryConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "en";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_USER_TEXT: &str = "Please respond to how I am feeling right now.";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_LEGACY_OPENAI_API_KEY: &str = "OPEN_API_KEY";
pub const ENV_LLM_BASE_URL: &str = "VOICE_MOOD_LLM_BASE_URL";
pub const ENV_AUDIO_MODEL: &str = "VOICE_MOOD_AUDIO_MODEL";
pub const ENV_TEXT_MODEL: &str = "VOICE_MOOD_TEXT_MODEL";
pub const ENV_VECTORIZER: &str = "VOICE_MOOD_VECTORIZER";
pub const ENV_PREAMBLES: &str = "VOICE_MOOD_PREAMBLES";

/// How an uploaded clip is turned into features before classification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureMode {
    /// Split on silence, one 13-dim MFCC mean per voiced segment, majority vote.
    #[default]
    SegmentVote,
    /// Exactly two seconds at 16 kHz, 13x300 MFCC matrix flattened, one label.
    FixedWindow,
}

impl FeatureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SegmentVote => "segment-vote",
            Self::FixedWindow => "fixed-window",
        }
    }
}

impl fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment-vote" | "segment" => Ok(Self::SegmentVote),
            "fixed-window" | "fixed" => Ok(Self::FixedWindow),
            other => Err(ConfigError::UnknownFeatureMode(other.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClassificationMode {
    pub feature: FeatureMode,
    /// Also transcribe the clip, classify the transcript and reconcile labels.
    pub text_fusion: bool,
}

impl fmt::Display for ClassificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text_fusion {
            write!(f, "{}+text", self.feature)
        } else {
            write!(f, "{}", self.feature)
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceTimeout {
    pub secs: u64,
}

impl ServiceTimeout {
    pub fn new(secs: u64) -> Result<Self, ConfigError> {
        if secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self { secs })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

impl Default for ServiceTimeout {
    fn default() -> Self {
        Self {
            secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    pub audio_model: PathBuf,
    pub text_model: Option<PathBuf>,
    pub vectorizer: Option<PathBuf>,
    pub preambles: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmConfig {
    pub base_url: Url,
    pub chat_model: String,
    pub transcription_model: String,
    pub language: String,
    pub timeout: ServiceTimeout,
}

impl LlmConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            chat_model: DEFAULT_CHAT_MODEL.to_owned(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_owned(),
            language: DEFAULT_TRANSCRIPTION_LANGUAGE.to_owned(),
            timeout: ServiceTimeout::default(),
        })
    }

    /// Joins `path` onto the base url, keeping any path prefix the base carries.
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub mode: ClassificationMode,
    pub models: ModelPaths,
    pub llm: LlmConfig,
    pub api_key: Option<ApiKey>,
    pub default_user_text: String,
    pub max_upload_bytes: usize,
    pub retry: RetryConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.text_fusion
            && (self.models.text_model.is_none() || self.models.vectorizer.is_none())
        {
            return Err(ConfigError::TextFusionRequiresTextModels);
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("timeout must be > 0 s")]
    ZeroTimeout,
    #[error("upload limit must be > 0 bytes")]
    ZeroUploadLimit,
    #[error("unknown feature mode: {0} (expected segment-vote or fixed-window)")]
    UnknownFeatureMode(String),
    #[error("text fusion needs both a text model and a vectorizer")]
    TextFusionRequiresTextModels,
    #[error("invalid base url {0}: {1}")]
    InvalidBaseUrl(String, String),
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl(raw.to_owned(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidBaseUrl(
            raw.to_owned(),
            format!("unsupported scheme {other}"),
        )),
    }
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_keys: &[&str],
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    if let Some(v) = cli_value {
        return Ok(Some(ApiKey::new(v)?));
    }
    for key in env_keys {
        if let Some(v) = env.var(key) {
            return Ok(Some(ApiKey::new(v)?));
        }
    }
    Ok(None)
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_path(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
) -> Option<PathBuf> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key).map(PathBuf::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 2] = [ENV_OPENAI_API_KEY, ENV_LEGACY_OPENAI_API_KEY];

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), &KEYS, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_falls_back_to_legacy_env_name() {
        let env = MapEnv::default().with_var(ENV_LEGACY_OPENAI_API_KEY, "legacy");
        let key = resolve_api_key(None, &KEYS, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "legacy");
    }

    #[test]
    fn api_key_primary_env_beats_legacy() {
        let env = MapEnv::default()
            .with_var(ENV_OPENAI_API_KEY, "primary")
            .with_var(ENV_LEGACY_OPENAI_API_KEY, "legacy");
        let key = resolve_api_key(None, &KEYS, &env).unwrap().unwrap();
        assert_eq!(key.expose(), "primary");
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "   ");
        assert_eq!(
            resolve_api_key(None, &KEYS, &env).unwrap_err(),
            ConfigError::EmptyApiKey
        );
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert!(!format!("{key:?}").contains("sk-secret"));
    }

    #[test]
    fn feature_mode_parses_aliases() {
        assert_eq!("segment-vote".parse::<FeatureMode>().unwrap(), FeatureMode::SegmentVote);
        assert_eq!("Fixed".parse::<FeatureMode>().unwrap(), FeatureMode::FixedWindow);
        assert!(matches!(
            "spectral".parse::<FeatureMode>(),
            Err(ConfigError::UnknownFeatureMode(_))
        ));
    }

    #[test]
    fn classification_mode_display() {
        let mode = ClassificationMode {
            feature: FeatureMode::FixedWindow,
            text_fusion: true,
        };
        assert_eq!(mode.to_string(), "fixed-window+text");
    }

    #[test]
    fn zero_timeout_rejected() {
        assert_eq!(ServiceTimeout::new(0).unwrap_err(), ConfigError::ZeroTimeout);
        assert_eq!(ServiceTimeout::new(5).unwrap().duration(), Duration::from_secs(5));
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let llm = LlmConfig::new("https://example.test/v1/").unwrap();
        assert_eq!(
            llm.endpoint("/chat/completions").as_str(),
            "https://example.test/v1/chat/completions"
        );
    }

    #[test]
    fn non_http_base_url_rejected() {
        assert!(matches!(
            LlmConfig::new("ftp://example.test"),
            Err(ConfigError::InvalidBaseUrl(_, _))
        ));
    }

    #[test]
    fn resolve_string_with_default_default_used_when_both_missing() {
        let env = MapEnv::default();
        let v = resolve_string_with_default(None, ENV_LLM_BASE_URL, &env, "def");
        assert_eq!(v, "def");
    }

    #[test]
    fn resolve_optional_path_reads_env() {
        let env = MapEnv::default().with_var(ENV_AUDIO_MODEL, "/models/audio.json");
        assert_eq!(
            resolve_optional_path(None, ENV_AUDIO_MODEL, &env),
            Some(PathBuf::from("/models/audio.json"))
        );
    }
}
