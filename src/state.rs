//! Shared application state injected into every handler.

use std::sync::Arc;

use crate::auth::keys::SigningKeys;
use crate::breakdown::Prompts;
use crate::config::Config;
use crate::llm::LlmProvider;
use crate::store::Store;

/// Every field is reference-counted or a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: SigningKeys,
    pub store: Store,
    pub llm: LlmProvider,
    pub prompts: Arc<Prompts>,
}

impl AppState {
    pub fn new(config: Config, keys: SigningKeys, store: Store, llm: LlmProvider) -> Self {
        let prompts = Prompts::load(&config.breakdown.prompts_dir);
        Self {
            config: Arc::new(config),
            keys,
            store,
            llm,
            prompts: Arc::new(prompts),
        }
    }
}
