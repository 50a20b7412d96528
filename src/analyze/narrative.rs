//! Model A: contextual narrative analysis.
//!
//! The top-K articles are folded into one prompt-like context and handed to a
//! pluggable completion backend (HTTP, mock, or disabled). The free-form
//! reply is parsed defensively into the closed `ModelVerdict` set; anything
//! unmappable degrades to a neutral zero-confidence output and never raises
//! past the analyzer boundary.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analyze::types::{ModelFailure, ModelOutput, ModelVerdict};
use crate::ingest::types::NewsArticle;

pub const MODEL_ID: &str = "contextual-narrative";

/// Completion backend behind Model A. Returns `None` when the backend is
/// unavailable or the call failed; the analyzer maps that to an invocation
/// failure (fallback ladder), not a parse failure.
#[async_trait::async_trait]
pub trait NarrativeBackend: Send + Sync {
    async fn complete(&self, context: &str) -> Option<String>;
    fn name(&self) -> &'static str;
}

pub type DynNarrativeBackend = Arc<dyn NarrativeBackend>;

/// Factory driven by environment, mirroring how the service boots:
/// * `AI_TEST_MODE=mock` -> deterministic mock backend
/// * `NARRATIVE_API_KEY` present -> HTTP backend
/// * otherwise -> disabled backend (every analysis becomes a model failure,
///   exercising the fallback ladder rather than fabricating sentiment)
pub fn build_backend_from_env() -> DynNarrativeBackend {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockNarrativeBackend {
            fixed: "neutral with confidence 0.5: no mock scenario configured".to_string(),
        });
    }
    if std::env::var("NARRATIVE_API_KEY").is_ok() {
        return Arc::new(HttpNarrativeBackend::new(None));
    }
    Arc::new(DisabledBackend)
}

/// HTTP chat-completions backend. Requires `NARRATIVE_API_KEY`.
pub struct HttpNarrativeBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl HttpNarrativeBackend {
    /// `model_override`: pass Some("gpt-4o-mini") to override the default.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("NARRATIVE_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("news-consensus-analyzer/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait::async_trait]
impl NarrativeBackend for HttpNarrativeBackend {
    async fn complete(&self, context: &str) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You are a market sentiment analyst. Read the numbered headlines and answer in one short paragraph stating a direction (bullish, bearish, or neutral) and a confidence between 0 and 1, e.g. 'bearish, confidence 0.7, because ...'.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: context,
                },
            ],
            temperature: 0.2,
            max_tokens: 160,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Always answers with a fixed reply; used in tests and `AI_TEST_MODE=mock`.
#[derive(Clone)]
pub struct MockNarrativeBackend {
    pub fixed: String,
}

#[async_trait::async_trait]
impl NarrativeBackend for MockNarrativeBackend {
    async fn complete(&self, _context: &str) -> Option<String> {
        Some(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Returns `None` always; used when no backend is configured.
pub struct DisabledBackend;

#[async_trait::async_trait]
impl NarrativeBackend for DisabledBackend {
    async fn complete(&self, _context: &str) -> Option<String> {
        None
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Fold the top-K articles into a single numbered context block.
pub fn build_context(symbol: &str, articles: &[NewsArticle], top_k: usize) -> String {
    let mut out = format!("Recent news for {symbol}:\n");
    for (i, a) in articles.iter().take(top_k).enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} - {}\n",
            i + 1,
            a.source,
            a.title,
            a.summary
        ));
    }
    out
}

/// Run Model A over the articles. `Err` means the backend call itself failed
/// (unavailable, transport, empty reply); parse problems degrade to a neutral
/// output instead.
pub async fn analyze_narrative(
    backend: &dyn NarrativeBackend,
    symbol: &str,
    articles: &[NewsArticle],
    top_k: usize,
) -> Result<ModelOutput, ModelFailure> {
    if articles.is_empty() {
        return Ok(ModelOutput::no_data(MODEL_ID));
    }

    let context = build_context(symbol, articles, top_k);
    let analyzed = articles.len().min(top_k);

    let Some(reply) = backend.complete(&context).await else {
        return Err(ModelFailure {
            model_id: MODEL_ID.to_string(),
            message: format!("{} backend returned no completion", backend.name()),
        });
    };

    let verdict = parse_reply(&reply);
    let reasoning = match &verdict {
        ModelVerdict::ParseFailure(desc) => format!("analysis failed: {desc}"),
        _ => sanitize_reasoning(&reply),
    };

    Ok(ModelOutput {
        model_id: MODEL_ID.to_string(),
        direction: verdict.direction(),
        confidence: verdict.confidence(),
        reasoning,
        articles_analyzed: analyzed,
        breakdown: None,
    })
}

/// Map a free-form reply onto the closed verdict set. Requires both a
/// recognizable direction word and a numeric confidence.
pub fn parse_reply(reply: &str) -> ModelVerdict {
    static RE_DIRECTION: OnceCell<Regex> = OnceCell::new();
    static RE_CONFIDENCE: OnceCell<Regex> = OnceCell::new();

    let re_dir = RE_DIRECTION
        .get_or_init(|| Regex::new(r"(?i)\b(bullish|bearish|neutral)\b").expect("direction regex"));
    let re_conf = RE_CONFIDENCE.get_or_init(|| {
        Regex::new(r"(?i)confidence[^0-9.]{0,12}(\d{1,3}\s*%|[01]?\.\d+|[01])").expect("confidence regex")
    });

    let Some(dir_m) = re_dir.find(reply) else {
        return ModelVerdict::ParseFailure("no direction in model reply".to_string());
    };

    let Some(conf_caps) = re_conf.captures(reply) else {
        return ModelVerdict::ParseFailure("no numeric confidence in model reply".to_string());
    };
    let raw = conf_caps[1].trim();
    let confidence = if let Some(pct) = raw.strip_suffix('%') {
        match pct.trim().parse::<f32>() {
            Ok(v) => v / 100.0,
            Err(_) => return ModelVerdict::ParseFailure("unparsable confidence".to_string()),
        }
    } else {
        match raw.parse::<f32>() {
            Ok(v) => v,
            Err(_) => return ModelVerdict::ParseFailure("unparsable confidence".to_string()),
        }
    };
    if !(0.0..=1.0).contains(&confidence) {
        return ModelVerdict::ParseFailure(format!("confidence {confidence} outside [0,1]"));
    }

    match dir_m.as_str().to_ascii_lowercase().as_str() {
        "bullish" => ModelVerdict::Bullish(confidence),
        "bearish" => ModelVerdict::Bearish(confidence),
        _ => ModelVerdict::Neutral(confidence),
    }
}

/// Single line, ASCII, <=240 chars. Collapses whitespace.
fn sanitize_reasoning(input: &str) -> String {
    let mut out = String::with_capacity(240);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= 240 {
            break;
        }
    }
    out.trim().to_string()
}
