use serde::{Deserialize, Deserializer, Serialize};

// ─── Conversation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry in the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─── Configuration ────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Plugin id OpenRouter uses for its web-search capability.
pub const WEB_PLUGIN: &str = "web";

/// Resolved settings for a chat session.
///
/// Built once at startup by the CLI layer (flags, env, config file and role
/// presets already merged) and passed by reference from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    /// Request the web-search plugin.
    pub online: bool,
    /// Seeds the history as a `system` message.
    pub system: Option<String>,
    /// Shell command that receives each answer on stdin.
    pub pipe: Option<String>,
    pub base_url: String,
}

impl ChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            online: false,
            system: None,
            pipe: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ─── Request body ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plugin {
    pub id: String,
}

/// `POST /chat/completions` body. Always streams.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

impl<'a> ChatRequest<'a> {
    pub fn new(history: &'a [Message], config: &'a ChatConfig) -> Self {
        let mut plugins = Vec::new();
        if config.online {
            plugins.push(Plugin {
                id: WEB_PLUGIN.to_string(),
            });
        }
        Self {
            model: &config.model,
            stream: true,
            messages: history,
            plugins,
        }
    }
}

// ─── Raw stream chunks ────────────────────────────────────────────────────

/// One `data:` payload as sent by the server. Nothing is assumed present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<RawChoice>,
    #[serde(default)]
    pub citations: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<RawError>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: RawDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Embedded `error` member. Usually `{code, message}`, occasionally a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawError {
    Detailed {
        #[serde(default)]
        code: Option<serde_json::Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

impl RawError {
    pub fn describe(&self) -> String {
        match self {
            RawError::Text(t) => t.clone(),
            RawError::Detailed { code, message } => match (message, code) {
                (Some(m), Some(c)) => format!("{m} (code {c})"),
                (Some(m), None) => m.clone(),
                (None, Some(c)) => format!("code {c}"),
                (None, None) => "unknown upstream error".to_string(),
            },
        }
    }
}

/// Token and cost accounting, usually on the final chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u64,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
