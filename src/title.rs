//! Conversation title generation.

use tracing::warn;

use crate::models::ChatMessage;
use crate::router::truncate_chars;
use crate::traits::ChatModel;

const TITLE_SYSTEM_PROMPT: &str = "Generate a very short title (at most five words) \
summarizing this conversation. Reply with the title only, no quotes, no punctuation \
around it.";

const MAX_TITLE_CHARS: usize = 50;
const FALLBACK_TITLE_CHARS: usize = 30;

/// Derive a short display title from the first exchange of a session.
///
/// Never fails: if the model call does, the fallback is the first 30
/// characters of the user's message.
pub async fn title_for(
    model: &dyn ChatModel,
    user_text: &str,
    bot_text: &str,
    temperature: f32,
) -> String {
    let messages = [
        ChatMessage::system(TITLE_SYSTEM_PROMPT),
        ChatMessage::user(format!("User: {}\nAssistant: {}", user_text, bot_text)),
    ];
    match model.complete(&messages, temperature).await {
        Ok(reply) => {
            let cleaned = reply.replace(['"', '\''], "");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                truncate_chars(user_text, FALLBACK_TITLE_CHARS)
            } else {
                truncate_chars(cleaned, MAX_TITLE_CHARS)
            }
        }
        Err(e) => {
            warn!(error = %e, "title generation failed; falling back to message prefix");
            truncate_chars(user_text, FALLBACK_TITLE_CHARS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::stream::BoxStream;

    struct Scripted {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, _m: &[ChatMessage], _t: f32) -> Result<String> {
            self.reply
                .map(|r| r.to_string())
                .ok_or_else(|| anyhow::anyhow!("model down"))
        }

        async fn stream(
            &self,
            _m: &[ChatMessage],
            _t: f32,
        ) -> Result<BoxStream<'static, Result<String>>> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn strips_quotes_and_trims() {
        let model = Scripted {
            reply: Some("  \"Trip to 'Fendale'\"  "),
        };
        assert_eq!(title_for(&model, "u", "b", 0.0).await, "Trip to Fendale");
    }

    #[tokio::test]
    async fn long_titles_are_capped_at_fifty_chars() {
        let model = Scripted {
            reply: Some(
                "A very long and thoroughly over-detailed conversation title that keeps going",
            ),
        };
        let title = title_for(&model, "u", "b", 0.0).await;
        assert_eq!(title.chars().count(), 50);
    }

    #[tokio::test]
    async fn failure_falls_back_to_thirty_char_prefix() {
        let model = Scripted { reply: None };
        let user = "Tell me everything about the history of the Laurania region";
        let title = title_for(&model, user, "b", 0.0).await;
        assert_eq!(title, user.chars().take(30).collect::<String>());
        assert_eq!(title.chars().count(), 30);
    }

    #[tokio::test]
    async fn empty_reply_also_falls_back() {
        let model = Scripted { reply: Some("\"\"") };
        assert_eq!(title_for(&model, "Hi there", "b", 0.0).await, "Hi there");
    }
}
