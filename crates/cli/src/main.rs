use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voice_mood_core::config::{
    resolve_api_key, resolve_optional_path, resolve_string_with_default, AppConfig,
    ClassificationMode, Env, FeatureMode, LlmConfig, ModelPaths, ServiceTimeout, StdEnv,
    DEFAULT_BIND_ADDR, DEFAULT_CHAT_MODEL, DEFAULT_LLM_BASE_URL, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TRANSCRIPTION_LANGUAGE, DEFAULT_TRANSCRIPTION_MODEL,
    DEFAULT_USER_TEXT, ENV_AUDIO_MODEL, ENV_LEGACY_OPENAI_API_KEY, ENV_LLM_BASE_URL,
    ENV_OPENAI_API_KEY, ENV_PREAMBLES, ENV_TEXT_MODEL, ENV_VECTORIZER,
};
use voice_mood_core::context::ModelContext;
use voice_mood_core::llm::{ChatClient, OpenAiChatClient};
use voice_mood_core::pipeline::{classify_audio, MoodPipeline, PipelineConfig};
use voice_mood_core::prompt::PromptComposer;
use voice_mood_core::server::{run_server, AppState};
use voice_mood_core::transcribe::{OpenAiTranscriber, Transcriber};
use voice_mood_core::util::RetryConfig;

#[derive(Parser, Debug)]
#[command(name = "voice-mood")]
#[command(about = "Voice mood classification with mood-aware LLM replies")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        bind: SocketAddr,

        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,

        #[arg(long, default_value = DEFAULT_USER_TEXT)]
        default_text: String,
    },
    /// Classify a local WAV file, optionally asking the LLM for a reply.
    Classify {
        wav: PathBuf,

        /// Also request a mood-aware reply for this text.
        #[arg(long)]
        respond: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    #[arg(long, global = true)]
    audio_model: Option<PathBuf>,

    #[arg(long, global = true)]
    text_model: Option<PathBuf>,

    #[arg(long, global = true)]
    vectorizer: Option<PathBuf>,

    #[arg(long, global = true)]
    preambles: Option<PathBuf>,

    /// segment-vote or fixed-window
    #[arg(long, default_value = "segment-vote", global = true)]
    mode: FeatureMode,

    /// Transcribe the clip and let the text label override the audio label.
    #[arg(long, default_value_t = false, global = true)]
    text_fusion: bool,

    #[arg(long, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, global = true)]
    llm_base_url: Option<String>,

    #[arg(long, default_value = DEFAULT_CHAT_MODEL, global = true)]
    chat_model: String,

    #[arg(long, default_value = DEFAULT_TRANSCRIPTION_MODEL, global = true)]
    transcription_model: String,

    #[arg(long, default_value = DEFAULT_TRANSCRIPTION_LANGUAGE, global = true)]
    language: String,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout_secs: u64,

    /// Attempts per external call, including the first.
    #[arg(long, default_value_t = 3, global = true)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let env = StdEnv;
    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
            default_text,
        } => {
            let cfg = build_config(cli.common, bind, max_upload_bytes, default_text, &env)?;
            tracing::info!(
                bind = %cfg.bind,
                mode = %cfg.mode,
                chat_model = %cfg.llm.chat_model,
                "config loaded"
            );
            serve(cfg).await
        }
        Command::Classify { wav, respond } => {
            reject_text_fusion(&cli.common)?;
            let cfg = build_config(
                cli.common,
                DEFAULT_BIND_ADDR.parse()?,
                DEFAULT_MAX_UPLOAD_BYTES,
                DEFAULT_USER_TEXT.to_owned(),
                &env,
            )?;
            classify_file(cfg, wav, respond).await
        }
    }
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let context = Arc::new(
        ModelContext::load(cfg.mode, &cfg.models).context("failed to load model artifacts")?,
    );
    let api_key = cfg
        .api_key
        .clone()
        .context("an OpenAI API key is required (--openai-api-key or OPENAI_API_KEY)")?;

    let chat: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::new(&cfg.llm, api_key.clone())?);
    let transcriber: Option<Arc<dyn Transcriber>> = if cfg.mode.text_fusion {
        Some(Arc::new(OpenAiTranscriber::new(&cfg.llm, api_key)?))
    } else {
        None
    };

    let pipeline = MoodPipeline::new(context, chat, transcriber, PipelineConfig::from_app(&cfg))?;
    run_server(AppState::new(pipeline), cfg.bind, cfg.max_upload_bytes)
        .await
        .context("http server failed")?;
    Ok(())
}

async fn classify_file(
    cfg: AppConfig,
    wav: PathBuf,
    respond: Option<String>,
) -> anyhow::Result<()> {
    let context = ModelContext::load(cfg.mode, &cfg.models).context("failed to load model artifacts")?;
    let bytes = std::fs::read(&wav).with_context(|| format!("failed to read {}", wav.display()))?;
    let verdict = classify_audio(&context, &bytes)?;
    let votes: Vec<String> = verdict.votes.iter().map(ToString::to_string).collect();
    println!("label: {} (votes: {})", verdict.label, votes.join(","));

    if let Some(text) = respond {
        let api_key = cfg
            .api_key
            .clone()
            .context("--respond needs an OpenAI API key")?;
        let composer = PromptComposer::new(
            OpenAiChatClient::new(&cfg.llm, api_key)?,
            context.preambles(),
            cfg.llm.timeout.duration(),
            cfg.retry.clone(),
        );
        let reply = composer.respond(verdict.label, &text).await?;
        println!("{reply}");
    }
    Ok(())
}

/// `classify` only reports the audio label; fusion needs the transcriber that `serve` wires up.
fn reject_text_fusion(args: &CommonArgs) -> anyhow::Result<()> {
    if args.text_fusion {
        anyhow::bail!("--text-fusion only applies to `serve`; `classify` reports the audio label");
    }
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(
    args: CommonArgs,
    bind: SocketAddr,
    max_upload_bytes: usize,
    default_user_text: String,
    env: &impl Env,
) -> anyhow::Result<AppConfig> {
    let audio_model = resolve_optional_path(args.audio_model, ENV_AUDIO_MODEL, env)
        .context("an audio model is required (--audio-model or VOICE_MOOD_AUDIO_MODEL)")?;
    let models = ModelPaths {
        audio_model,
        text_model: resolve_optional_path(args.text_model, ENV_TEXT_MODEL, env),
        vectorizer: resolve_optional_path(args.vectorizer, ENV_VECTORIZER, env),
        preambles: resolve_optional_path(args.preambles, ENV_PREAMBLES, env),
    };

    let base_url =
        resolve_string_with_default(args.llm_base_url, ENV_LLM_BASE_URL, env, DEFAULT_LLM_BASE_URL);
    let mut llm = LlmConfig::new(&base_url)?;
    llm.chat_model = args.chat_model;
    llm.transcription_model = args.transcription_model;
    llm.language = args.language;
    llm.timeout = ServiceTimeout::new(args.timeout_secs)?;

    let api_key = resolve_api_key(
        args.openai_api_key,
        &[ENV_OPENAI_API_KEY, ENV_LEGACY_OPENAI_API_KEY],
        env,
    )?;

    let cfg = AppConfig {
        bind,
        mode: ClassificationMode {
            feature: args.mode,
            text_fusion: args.text_fusion,
        },
        models,
        llm,
        api_key,
        default_user_text,
        max_upload_bytes,
        retry: RetryConfig::new(args.retries, Duration::from_millis(500)),
    };
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_mood_core::config::MapEnv;

    fn common(extra: &[&str]) -> CommonArgs {
        let mut argv = vec!["voice-mood"];
        argv.extend_from_slice(extra);
        argv.push("serve");
        Cli::try_parse_from(argv).unwrap().common
    }

    fn addr() -> SocketAddr {
        DEFAULT_BIND_ADDR.parse().unwrap()
    }

    #[test]
    fn audio_model_falls_back_to_env() {
        let env = MapEnv::default()
            .with_var(ENV_AUDIO_MODEL, "/models/audio.json")
            .with_var(ENV_LEGACY_OPENAI_API_KEY, "legacy");
        let cfg = build_config(common(&[]), addr(), 1024, "hi".to_owned(), &env).unwrap();
        assert_eq!(cfg.models.audio_model, PathBuf::from("/models/audio.json"));
        assert_eq!(cfg.api_key.unwrap().expose(), "legacy");
        assert_eq!(cfg.mode.feature, FeatureMode::SegmentVote);
        assert_eq!(cfg.llm.base_url.as_str(), "https://api.openai.com/v1");
    }

    #[test]
    fn missing_audio_model_is_an_error() {
        let err = build_config(common(&[]), addr(), 1024, "hi".to_owned(), &MapEnv::default());
        assert!(err.is_err());
    }

    #[test]
    fn text_fusion_without_text_models_is_rejected() {
        let args = common(&["--audio-model", "a.json", "--text-fusion"]);
        let err = build_config(args, addr(), 1024, "hi".to_owned(), &MapEnv::default());
        assert!(err.is_err());
    }

    #[test]
    fn classify_rejects_text_fusion() {
        let cli = Cli::try_parse_from(["voice-mood", "--text-fusion", "classify", "clip.wav"]).unwrap();
        assert!(matches!(cli.command, Command::Classify { .. }));
        assert!(reject_text_fusion(&cli.common).is_err());

        let cli = Cli::try_parse_from(["voice-mood", "classify", "clip.wav"]).unwrap();
        assert!(reject_text_fusion(&cli.common).is_ok());
    }

    #[test]
    fn fixed_window_mode_parses() {
        let args = common(&["--audio-model", "a.json", "--mode", "fixed-window"]);
        let cfg = build_config(args, addr(), 1024, "hi".to_owned(), &MapEnv::default()).unwrap();
        assert_eq!(cfg.mode.feature, FeatureMode::FixedWindow);
        assert!(cfg.api_key.is_none());
    }
}
