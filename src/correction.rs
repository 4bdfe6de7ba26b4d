//! OCR noise correction through a chat-completion model.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chat::{ChatClient, ChatClientError, ChatMessage, ChatRequest};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const CORRECTION_INSTRUCTION: &str = "The following text was extracted from an image or a document using OCR. \
If any part was misread or is wrong, correct it and output the text as it was most likely meant to read. \
If nothing needs correcting, return the text unchanged. \
Improve the text without losing any of its information: do not shorten it and keep all of the original content.";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f64 = 0.3;
const TOP_P: f64 = 0.9;

/// Errors raised while correcting text.
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// The chat model could not produce a correction.
    #[error("Text correction failed: {0}")]
    Chat(#[from] ChatClientError),
}

/// Result of correcting a sequence of chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkCorrection {
    /// Corrected chunks joined with `\n`, in their original order.
    pub text: String,
    /// Number of chunks that were corrected.
    pub corrected: usize,
    /// Zero-based indices of chunks dropped because their correction failed.
    pub skipped: Vec<usize>,
}

/// Sends extracted text through the correction prompt.
#[derive(Clone)]
pub struct TextCorrector {
    chat: Arc<dyn ChatClient>,
}

impl TextCorrector {
    /// Wrap a chat client.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// Correct a single piece of text, returning the model's answer trimmed.
    pub async fn correct(&self, text: &str) -> Result<String, CorrectionError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(correction_prompt(text)),
            ],
            max_tokens: Some(MAX_TOKENS),
            temperature: TEMPERATURE,
            top_p: Some(TOP_P),
        };
        let corrected = self.chat.complete(request).await?;
        Ok(corrected.trim().to_string())
    }

    /// Correct chunks one after another, dropping any chunk whose correction fails.
    pub async fn correct_chunks(&self, chunks: &[String]) -> ChunkCorrection {
        let mut corrected = Vec::with_capacity(chunks.len());
        let mut skipped = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            tracing::info!(chunk = index + 1, total = chunks.len(), "Correcting chunk");
            match self.correct(chunk).await {
                Ok(text) => corrected.push(text),
                Err(error) => {
                    tracing::warn!(chunk = index + 1, error = %error, "Skipping chunk after failed correction");
                    skipped.push(index);
                }
            }
        }

        ChunkCorrection {
            corrected: corrected.len(),
            text: corrected.join("\n"),
            skipped,
        }
    }
}

fn correction_prompt(text: &str) -> String {
    format!("{CORRECTION_INSTRUCTION}:\n\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the text after the prompt in upper case, failing for any text containing "fail".
    #[derive(Default)]
    struct ScriptedChat {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            let prompt = request.messages[1].content.clone();
            self.requests.lock().unwrap().push(request);
            let text = prompt.split("\n\n").nth(1).unwrap_or_default();
            if text.contains("fail") {
                return Err(ChatClientError::GenerationFailed("scripted".into()));
            }
            Ok(format!(" {} ", text.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn correct_uses_fixed_sampling_settings() {
        let chat = Arc::new(ScriptedChat::default());
        let corrector = TextCorrector::new(chat.clone());

        let text = corrector.correct("he1lo world").await.expect("corrected");

        assert_eq!(text, "HE1LO WORLD");
        let requests = chat.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.messages[0].content, "You are a helpful assistant.");
        assert!(request.messages[1].content.ends_with(":\n\nhe1lo world"));
    }

    #[test]
    fn prompt_asks_for_correct_text_to_pass_through() {
        let prompt = correction_prompt("Invoice 2024");
        assert!(prompt.contains("If nothing needs correcting, return the text unchanged."));
        assert!(prompt.contains("do not shorten it"));
        assert!(prompt.ends_with(":\n\nInvoice 2024"));
    }

    #[tokio::test]
    async fn failed_chunk_is_omitted_and_order_preserved() {
        let corrector = TextCorrector::new(Arc::new(ScriptedChat::default()));
        let chunks = vec![
            "first".to_string(),
            "please fail".to_string(),
            "third".to_string(),
            "fourth".to_string(),
        ];

        let outcome = corrector.correct_chunks(&chunks).await;

        assert_eq!(outcome.text, "FIRST\nTHIRD\nFOURTH");
        assert_eq!(outcome.corrected, 3);
        assert_eq!(outcome.skipped, vec![1]);
    }

    #[tokio::test]
    async fn all_chunks_failing_yields_empty_text() {
        let corrector = TextCorrector::new(Arc::new(ScriptedChat::default()));
        let chunks = vec!["fail a".to_string(), "fail b".to_string()];

        let outcome = corrector.correct_chunks(&chunks).await;

        assert_eq!(outcome.text, "");
        assert_eq!(outcome.skipped, vec![0, 1]);
    }

    #[tokio::test]
    async fn chunk_text_mentioning_error_is_not_treated_as_failure() {
        let corrector = TextCorrector::new(Arc::new(ScriptedChat::default()));
        let chunks = vec!["Error codes table".to_string()];

        let outcome = corrector.correct_chunks(&chunks).await;

        assert_eq!(outcome.text, "ERROR CODES TABLE");
        assert!(outcome.skipped.is_empty());
    }
}
