//! Named gateway registry
//!
//! One long-lived [`Llm`] per configuration name, built lazily on first use and
//! never rebuilt afterwards. Construction goes through an injected factory so
//! tests can hand out mock transports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use fusion_config::{Config, LlmSettings, DEFAULT_LLM};

use crate::{Llm, OllamaProvider, Provider, RetryPolicy, Result};

/// Builds the transport for one settings entry
pub type ProviderFactory = Arc<dyn Fn(&LlmSettings) -> Arc<dyn Provider> + Send + Sync>;

pub struct LlmRegistry {
    config: Config,
    factory: ProviderFactory,
    instances: Mutex<HashMap<String, Arc<Llm>>>,
}

impl LlmRegistry {
    pub fn new(config: &Config, factory: ProviderFactory) -> Self {
        Self {
            config: config.clone(),
            factory,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry whose transports talk to Ollama endpoints
    pub fn ollama(config: &Config) -> Self {
        let factory: ProviderFactory = Arc::new(|settings: &LlmSettings| {
            Arc::new(OllamaProvider::from_settings(settings)) as Arc<dyn Provider>
        });
        Self::new(config, factory)
    }

    /// Gateway for `name`, falling back to the default settings
    pub fn get(&self, name: &str) -> Result<Arc<Llm>> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(llm) = instances.get(name) {
            return Ok(llm.clone());
        }

        let settings = self.config.llm_settings(name)?;
        let llm = Arc::new(
            Llm::new((self.factory)(settings), settings)
                .with_retry(RetryPolicy::from(&self.config.retry)),
        );
        debug!(name, model = %llm.model(), "Constructed gateway");

        instances.insert(name.to_string(), llm.clone());
        Ok(llm)
    }

    pub fn default_llm(&self) -> Result<Arc<Llm>> {
        self.get(DEFAULT_LLM)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
