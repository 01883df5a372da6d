use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// Process-wide settings, loaded once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub chat_model: String,
    pub rerank_model: String,
    pub rerank_enabled: bool,
    pub temperature: f64,
    /// Stream chat completions over SSE instead of waiting for the full body.
    pub stream: bool,
    /// Ask the provider for reasoning deltas and forward them to the stream sink.
    pub show_think: bool,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
    pub data_dir: PathBuf,
    pub pipeline: PipelineConfig,
}

/// Knobs for the research loop and its stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub clarify_questions: usize,
    pub max_loops: u32,
    pub stop_on_stagnation: bool,
    /// Results requested per sub-goal search.
    pub search_limit: usize,
    /// Cap on documents kept by the filter per sub-goal.
    pub filter_top_k: usize,
    pub clean_docs: bool,
    pub clean_max_chars: usize,
    pub writer_max_docs: usize,
    pub writer_max_chars_per_doc: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clarify_questions: 3,
            max_loops: 3,
            stop_on_stagnation: true,
            search_limit: 8,
            filter_top_k: 8,
            clean_docs: true,
            clean_max_chars: 12_000,
            writer_max_docs: 8,
            writer_max_chars_per_doc: 1200,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_base_url: "https://api.siliconflow.cn/v1".to_string(),
            chat_model: "deepseek-ai/DeepSeek-V3".to_string(),
            rerank_model: "Qwen/Qwen3-Reranker-8B".to_string(),
            rerank_enabled: false,
            temperature: 0.2,
            stream: true,
            show_think: true,
            tavily_api_key: None,
            tavily_base_url: "https://api.tavily.com".to_string(),
            data_dir: PathBuf::from("data"),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings from `.env` and the process environment.
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        let defaults = Settings::default();

        let top_k = parsed("DEFAULT_TOPK", defaults.pipeline.filter_top_k);
        let pipeline = PipelineConfig {
            clarify_questions: parsed("CLARIFY_QUESTIONS", defaults.pipeline.clarify_questions),
            max_loops: parsed("MAX_LOOPS", defaults.pipeline.max_loops),
            stop_on_stagnation: flag("STOP_ON_STAGNATION", defaults.pipeline.stop_on_stagnation),
            search_limit: top_k,
            filter_top_k: top_k,
            clean_docs: flag("CLEAN_DOCS", defaults.pipeline.clean_docs),
            clean_max_chars: parsed("CLEAN_MAX_CHARS", defaults.pipeline.clean_max_chars),
            writer_max_docs: parsed("WRITER_MAX_DOCS", defaults.pipeline.writer_max_docs),
            writer_max_chars_per_doc: parsed(
                "WRITER_MAX_CHARS_PER_DOC",
                defaults.pipeline.writer_max_chars_per_doc,
            ),
        };

        Self {
            llm_api_key: secret("SILICONFLOW_API_KEY").or_else(|| secret("LLM_API_KEY")),
            llm_base_url: text("SILICONFLOW_BASE_URL", defaults.llm_base_url),
            chat_model: text("SF_CHAT_MODEL", defaults.chat_model),
            rerank_model: text("SF_RERANK_MODEL", defaults.rerank_model),
            rerank_enabled: flag("RERANK_ENABLED", defaults.rerank_enabled),
            temperature: parsed("LLM_TEMPERATURE", defaults.temperature),
            stream: flag("LLM_STREAM", defaults.stream),
            show_think: flag("SHOW_THINK", defaults.show_think),
            tavily_api_key: secret("TAVILY_API_KEY"),
            tavily_base_url: text("TAVILY_BASE_URL", defaults.tavily_base_url),
            data_dir: PathBuf::from(text("DATA_DIR", "data".to_string())),
            pipeline,
        }
    }

    /// Key prefix for startup logging, never the full secret.
    pub fn key_prefix(&self) -> String {
        match &self.llm_api_key {
            Some(k) => format!("{}***", k.chars().take(6).collect::<String>()),
            None => "EMPTY".to_string(),
        }
    }
}

fn secret(key: &str) -> Option<String> {
    dotenv::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn text(key: &str, default: String) -> String {
    secret(key).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match secret(key) {
        Some(v) => parse_flag(&v),
        None => default,
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "True" | "TRUE" | "yes")
}

fn parsed<T: FromStr + Copy>(key: &str, default: T) -> T {
    match secret(key) {
        Some(v) => v.parse::<T>().unwrap_or_else(|_| {
            warn!(key, value = %v, "Unparseable setting, using default");
            default
        }),
        None => default,
    }
}
