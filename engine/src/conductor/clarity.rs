//! Clarity classifier
//!
//! Decides whether a request can be answered as-is. Fails open: anything
//! other than an unambiguous `NEED_MORE` means proceed.

use crate::conductor::types::ClarityVerdict;
use crate::llm::{strip_thinking, CompletionPort};
use sdk::errors::EngineError;
use std::sync::Arc;

const NEED_MORE: &str = "NEED_MORE";
const PROCEED: &str = "PROCEED";

const SYSTEM_PROMPT: &str = "You only judge whether a user request is clear enough to answer.\n\
Answer NEED_MORE only when the request is extremely ambiguous, such as a single bare \
keyword like \"coffee\" or \"food\".\n\
Answer PROCEED in every other case, e.g. \"ice coffee\", \"Paris\", \"weather information\".\n\
Output exactly one token: NEED_MORE or PROCEED.";

pub struct ClarityClassifier {
    port: Arc<dyn CompletionPort>,
}

impl ClarityClassifier {
    pub fn new(port: Arc<dyn CompletionPort>) -> Self {
        Self { port }
    }

    /// Classify the request. Completion errors are returned so the caller
    /// can log them; the caller treats them as `Proceed`.
    pub async fn classify(
        &self,
        user_input: &str,
        recalled_context: Option<&str>,
    ) -> Result<ClarityVerdict, EngineError> {
        let prompt = format!(
            "User request: \"{}\"\nConversation history: {}\n\n\
            Can this request be answered using the history and no further information?\n\
            Output NEED_MORE or PROCEED only.",
            user_input,
            recalled_context.unwrap_or("(none)")
        );

        let response = self.port.complete_with_system(SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_verdict(&response))
    }
}

/// Closed-set parser: `NEED_MORE` without `PROCEED` is the only way to ask
pub fn parse_verdict(text: &str) -> ClarityVerdict {
    let text = strip_thinking(text).to_uppercase();
    if text.contains(NEED_MORE) && !text.contains(PROCEED) {
        ClarityVerdict::NeedMore
    } else {
        ClarityVerdict::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_need_more_token() {
        assert_eq!(parse_verdict("NEED_MORE"), ClarityVerdict::NeedMore);
        assert_eq!(parse_verdict("  \"need_more\"\n"), ClarityVerdict::NeedMore);
    }

    #[test]
    fn test_everything_else_proceeds() {
        assert_eq!(parse_verdict("PROCEED"), ClarityVerdict::Proceed);
        assert_eq!(parse_verdict(""), ClarityVerdict::Proceed);
        assert_eq!(parse_verdict("I'm not sure"), ClarityVerdict::Proceed);
        assert_eq!(parse_verdict("NEED MORE"), ClarityVerdict::Proceed);
        assert_eq!(parse_verdict("NEED_MORE or PROCEED"), ClarityVerdict::Proceed);
    }

    #[test]
    fn test_thinking_is_ignored() {
        assert_eq!(
            parse_verdict("<thinking>maybe NEED_MORE?</thinking>PROCEED"),
            ClarityVerdict::Proceed
        );
        assert_eq!(
            parse_verdict("<thinking>PROCEED seems wrong</thinking>NEED_MORE"),
            ClarityVerdict::NeedMore
        );
    }
}
