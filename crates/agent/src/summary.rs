//! Final answer generation
//!
//! Summaries are produced by an ordered list of strategies. The first one that
//! succeeds wins; when every strategy fails an apology is composed locally, so
//! a run always ends with user-facing text.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use fusion_provider::{Llm, Message};

use crate::prompt;
use crate::Result;

pub const FINAL_ANSWER_OPEN: &str = "===== FINAL ANSWER =====";
pub const FINAL_ANSWER_CLOSE: &str = "=======================";

/// Wrap an answer in the final-answer markers
pub fn envelope(answer: &str) -> String {
    format!("{}\n\n{}\n\n{}", FINAL_ANSWER_OPEN, answer, FINAL_ANSWER_CLOSE)
}

/// Answer text between the final-answer markers
pub fn extract_final_answer(text: &str) -> Option<&str> {
    let start = text.find(FINAL_ANSWER_OPEN)? + FINAL_ANSWER_OPEN.len();
    let rest = &text[start..];
    let end = rest.find(FINAL_ANSWER_CLOSE).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Which tier produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
    Primary,
    Fallback,
    LastResort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Full text handed back to the caller
    pub text: String,
    /// Bare answer inside the envelope
    pub answer: String,
    pub source: SummarySource,
}

/// What a summary is about
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub question: &'a str,
    /// Status reported by the terminating tool, if any
    pub status: Option<&'a str>,
}

#[async_trait]
pub trait SummaryStrategy: Send + Sync {
    fn name(&self) -> &str;
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<Summary>;
}

/// Bounded direct answer from the agent's own gateway, tagged with a status
pub struct DirectSummary {
    llm: Arc<Llm>,
}

impl DirectSummary {
    pub fn new(llm: Arc<Llm>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SummaryStrategy for DirectSummary {
    fn name(&self) -> &str {
        "direct"
    }

    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<Summary> {
        let prompt = prompt::summary_prompt(request.question);
        let answer = self
            .llm
            .ask(&[Message::user(prompt)], None, false, None)
            .await?;

        let status = request.status.unwrap_or("success");
        Ok(Summary {
            text: format!(
                "The interaction has been completed with status: {}\n\n{}",
                status,
                envelope(&answer)
            ),
            answer,
            source: SummarySource::Primary,
        })
    }
}

/// Shorter answer from the default gateway
pub struct SimpleSummary {
    llm: Arc<Llm>,
}

impl SimpleSummary {
    pub fn new(llm: Arc<Llm>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SummaryStrategy for SimpleSummary {
    fn name(&self) -> &str {
        "simple"
    }

    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<Summary> {
        let prompt = prompt::fallback_prompt(request.question);
        let answer = self
            .llm
            .ask(&[Message::user(prompt)], None, false, None)
            .await?;

        Ok(Summary {
            text: envelope(&answer),
            answer,
            source: SummarySource::Fallback,
        })
    }
}

/// Apology composed without any I/O
pub fn apology(question: &str) -> Summary {
    let answer = format!(
        "Sorry, I couldn't generate an answer to your question: '{}'\n\
         Please try asking again or rephrasing your question.",
        question
    );
    Summary {
        text: envelope(&answer),
        answer,
        source: SummarySource::LastResort,
    }
}

/// Ordered summary strategies with a guaranteed last resort
pub struct SummaryChain {
    primary: Option<Box<dyn SummaryStrategy>>,
    fallbacks: Vec<Box<dyn SummaryStrategy>>,
}

impl SummaryChain {
    /// Direct answer from `llm`, then a simple answer from `fallback_llm`
    pub fn new(llm: Arc<Llm>, fallback_llm: Arc<Llm>) -> Self {
        Self {
            primary: Some(Box::new(DirectSummary::new(llm))),
            fallbacks: vec![Box::new(SimpleSummary::new(fallback_llm))],
        }
    }

    pub fn from_strategies(
        primary: Option<Box<dyn SummaryStrategy>>,
        fallbacks: Vec<Box<dyn SummaryStrategy>>,
    ) -> Self {
        Self { primary, fallbacks }
    }

    /// Every tier, primary first
    pub async fn summarize(&self, request: &SummaryRequest<'_>) -> Summary {
        let tiers = self.primary.iter().chain(self.fallbacks.iter());
        Self::first_success(tiers, request).await
    }

    /// Skip the primary tier, used once the agent's own gateway has failed
    pub async fn recover(&self, request: &SummaryRequest<'_>) -> Summary {
        Self::first_success(self.fallbacks.iter(), request).await
    }

    async fn first_success<'s>(
        tiers: impl Iterator<Item = &'s Box<dyn SummaryStrategy>>,
        request: &SummaryRequest<'_>,
    ) -> Summary {
        for strategy in tiers {
            match strategy.summarize(request).await {
                Ok(summary) => {
                    info!("◆ FINAL ANSWER FROM '{}' SUMMARY", strategy.name());
                    return summary;
                }
                Err(e) => warn!("Summary strategy '{}' failed: {}", strategy.name(), e),
            }
        }

        error!("All summary strategies failed, composing apology");
        apology(request.question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentError;

    struct Fixed(&'static str, Option<&'static str>);

    #[async_trait]
    impl SummaryStrategy for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn summarize(&self, _request: &SummaryRequest<'_>) -> Result<Summary> {
            match self.1 {
                Some(answer) => Ok(Summary {
                    text: envelope(answer),
                    answer: answer.to_string(),
                    source: SummarySource::Fallback,
                }),
                None => Err(AgentError::ToolExecution("offline".to_string())),
            }
        }
    }

    fn request() -> SummaryRequest<'static> {
        SummaryRequest {
            question: "What is 2+2?",
            status: None,
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let text = format!("preamble\n\n{}", envelope("4"));
        assert_eq!(extract_final_answer(&text), Some("4"));
        assert_eq!(extract_final_answer("plain text"), None);
    }

    #[test]
    fn test_extract_without_closing_marker() {
        assert_eq!(
            extract_final_answer("===== FINAL ANSWER =====\n\n  partial  "),
            Some("partial")
        );
    }

    #[test]
    fn test_apology_mentions_question() {
        let summary = apology("What is 2+2?");
        assert_eq!(summary.source, SummarySource::LastResort);
        assert!(summary.text.starts_with(FINAL_ANSWER_OPEN));
        assert!(summary.answer.contains("'What is 2+2?'"));
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let chain = SummaryChain::from_strategies(
            Some(Box::new(Fixed("primary", None))),
            vec![
                Box::new(Fixed("second", Some("from second"))),
                Box::new(Fixed("third", Some("from third"))),
            ],
        );
        let summary = chain.summarize(&request()).await;
        assert_eq!(summary.answer, "from second");
    }

    #[tokio::test]
    async fn test_all_failures_yield_apology() {
        let chain = SummaryChain::from_strategies(
            Some(Box::new(Fixed("primary", None))),
            vec![Box::new(Fixed("second", None))],
        );
        let summary = chain.summarize(&request()).await;
        assert_eq!(summary.source, SummarySource::LastResort);
    }

    #[tokio::test]
    async fn test_recover_skips_primary() {
        let chain = SummaryChain::from_strategies(
            Some(Box::new(Fixed("primary", Some("from primary")))),
            vec![Box::new(Fixed("second", Some("from second")))],
        );
        assert_eq!(chain.recover(&request()).await.answer, "from second");
    }
}
