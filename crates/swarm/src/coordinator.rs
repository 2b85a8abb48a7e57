//! Swarm coordinator: pipeline plus direct-answer fallback

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use fusion_config::SwarmSettings;
use fusion_provider::{Llm, Message};

use crate::cache::BoundedCache;
use crate::pipeline::MultiAgentPipeline;

pub struct SwarmCoordinator {
    pipeline: MultiAgentPipeline,
    fallback: Arc<Llm>,
    cache: BoundedCache<String, String>,
}

impl SwarmCoordinator {
    pub fn new(pipeline: MultiAgentPipeline, fallback: Arc<Llm>, cache_capacity: usize) -> Self {
        Self {
            pipeline,
            fallback,
            cache: BoundedCache::new(cache_capacity),
        }
    }

    /// Pipeline agents derive their handles from `llm`, which also answers
    /// when the pipeline fails
    pub fn from_settings(llm: Arc<Llm>, settings: &SwarmSettings) -> Self {
        let pipeline = MultiAgentPipeline::new(&llm, settings);
        Self::new(pipeline, llm, settings.cache_capacity)
    }

    pub fn pipeline(&self) -> &MultiAgentPipeline {
        &self.pipeline
    }

    /// Results of past successful queries. Filled on every success but not
    /// consulted before running the pipeline.
    pub fn cache(&self) -> &BoundedCache<String, String> {
        &self.cache
    }

    /// Always produces text
    pub async fn process_query(&mut self, query: &str) -> String {
        let start = Instant::now();
        info!("◆ STARTING MULTI-AGENT PROCESSING");

        match self.pipeline.execute_workflow(query).await {
            Ok(answer) => {
                info!(
                    "◆ MULTI-AGENT PROCESSING COMPLETED in {:.2} seconds",
                    start.elapsed().as_secs_f64()
                );
                self.cache.set(query.to_string(), answer.clone());
                answer
            }
            Err(e) => {
                error!("Multi-agent pipeline error: {}", e);
                self.direct_answer(query, &e.to_string()).await
            }
        }
    }

    async fn direct_answer(&self, query: &str, pipeline_error: &str) -> String {
        let prompt = format!(
            "Provide a concise answer to: {}\n\nError occurred in multi-agent pipeline: {}",
            query, pipeline_error
        );

        match self
            .fallback
            .ask(&[Message::user(prompt)], None, false, None)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!("Fallback error: {}", e);
                format!("Unable to process query. Error: {}", pipeline_error)
            }
        }
    }
}
