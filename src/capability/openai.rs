//! OpenAI-compatible HTTP adapters.
//!
//! Talks to `/v1/embeddings` and `/v1/chat/completions` on any endpoint that
//! speaks the OpenAI wire format. Calls are blocking; each adapter builds its
//! `reqwest` client on first use.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Answer, Answerer, Embedder, Summarizer};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Endpoint, key and lazily built client shared by the three adapters.
#[derive(Debug)]
struct Endpoint {
    base: String,
    api_key: String,
    model: String,
    client: OnceLock<Client>,
}

impl Endpoint {
    fn new(base: &str, api_key: &str, model: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: OnceLock::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        if self.base.ends_with("/v1") {
            format!("{}/{}", self.base, path)
        } else {
            format!("{}/v1/{}", self.base, path)
        }
    }

    fn client(&self, capability: &'static str) -> Result<&Client> {
        if let Some(c) = self.client.get() {
            return Ok(c);
        }
        let built = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::capability(capability, e.to_string()))?;
        // A concurrent first call may have won the race; either client works.
        Ok(self.client.get_or_init(|| built))
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        capability: &'static str,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self.url(path);
        debug!(%url, model = %self.model, capability, "sending request");

        let resp = self
            .client(capability)?
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| Error::capability(capability, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "Unable to read body".to_string());
            warn!(%status, capability, "request failed");
            return Err(Error::capability(capability, format!("HTTP {status}: {text}")));
        }

        resp.json::<R>()
            .map_err(|e| Error::capability(capability, format!("failed to parse response: {e}")))
    }
}

#[derive(Serialize)]
struct EmbeddingReq<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResp {
    data: Vec<EmbeddingItem>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResp {
    choices: Vec<ChatChoice>,
}

impl ChatResp {
    fn first_content(self, capability: &'static str) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::capability(capability, "empty completion"))
    }
}

/// Embeddings from `/v1/embeddings`.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    endpoint: Endpoint,
    dimension: Option<usize>,
}

impl OpenAiEmbedder {
    /// Adapter for `model` at `base` (e.g. `https://api.openai.com`).
    pub fn new(base: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: Endpoint::new(base, api_key, model),
            dimension: None,
        }
    }

    /// Declare the model's output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

impl Embedder for OpenAiEmbedder {
    fn create_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.create_embeddings(&[text])?;
        out.pop()
            .ok_or_else(|| Error::capability("embedding", "no embedding returned"))
    }

    fn create_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::EmptyText);
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingReq {
            model: &self.endpoint.model,
            input: texts.iter().map(|t| t.trim()).collect(),
        };
        let mut resp: EmbeddingResp = self.endpoint.post("embedding", "embeddings", &body)?;
        if resp.data.len() != texts.len() {
            return Err(Error::capability(
                "embedding",
                format!("expected {} embeddings, got {}", texts.len(), resp.data.len()),
            ));
        }
        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Summaries from `/v1/chat/completions`.
#[derive(Debug)]
pub struct OpenAiSummarizer {
    endpoint: Endpoint,
}

impl OpenAiSummarizer {
    /// Adapter for `model` at `base`.
    pub fn new(base: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: Endpoint::new(base, api_key, model),
        }
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, texts: &[&str], max_length: usize) -> Result<String> {
        let combined = texts.join("\n\n");
        let prompt = format!(
            "Summarize the following text chunks, preserving key facts such as:\n\
             - Monetary amounts and percentages\n\
             - Dates and time periods\n\
             - Company names and entities\n\
             - Metrics and important trends\n\n\
             Text to summarize:\n{combined}\n\n\
             Provide a concise summary in {max_length} tokens or less."
        );
        let body = ChatReq {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a document summarization expert.",
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: u32::try_from(max_length).ok(),
            temperature: 0.3,
        };
        let resp: ChatResp = self.endpoint.post("summarization", "chat/completions", &body)?;
        resp.first_content("summarization")
    }
}

/// Answers from `/v1/chat/completions`.
#[derive(Debug)]
pub struct OpenAiAnswerer {
    endpoint: Endpoint,
}

impl OpenAiAnswerer {
    /// Adapter for `model` at `base`.
    pub fn new(base: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: Endpoint::new(base, api_key, model),
        }
    }
}

impl Answerer for OpenAiAnswerer {
    fn answer_question(&self, context: &str, question: &str) -> Result<Answer> {
        let prompt = format!(
            "Answer the following question based ONLY on the provided context.\n\n\
             Context:\n{context}\n\n\
             Question: {question}\n\n\
             Instructions:\n\
             1. Provide a clear, concise answer based on the context\n\
             2. Cite figures accurately\n\
             3. If the context doesn't contain enough information, say so\n\n\
             Answer:"
        );
        let body = ChatReq {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an analyst assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: Some(500),
            temperature: 0.2,
        };
        let resp: ChatResp = self.endpoint.post("answer", "chat/completions", &body)?;
        let answer = resp.first_content("answer")?;
        Ok(Answer {
            answer,
            confidence: 1.0,
            context: context.to_string(),
            question: question.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let e = Endpoint::new("https://api.example.com/", "k", "m");
        assert_eq!(e.url("embeddings"), "https://api.example.com/v1/embeddings");
        let e = Endpoint::new("http://localhost:8080/v1", "k", "m");
        assert_eq!(e.url("chat/completions"), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_blank_text_rejected_before_request() {
        let e = OpenAiEmbedder::new("http://127.0.0.1:9", "k", "m");
        assert!(matches!(e.create_embedding(" "), Err(Error::EmptyText)));
    }

    #[test]
    fn test_chat_response_parsing() {
        let resp: ChatResp =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":" hi "}}]}"#)
                .unwrap();
        assert_eq!(resp.first_content("answer").unwrap(), "hi");

        let empty: ChatResp = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.first_content("answer").is_err());
    }
}
