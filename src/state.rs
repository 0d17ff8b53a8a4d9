use std::sync::Arc;

use crate::auth::repo::UserStore;
use crate::chat::ChatClient;
use crate::config::AppConfig;
use crate::db::PgStore;
use crate::mail::{self, Mailer};
use crate::recipes::repo::RecipeStore;
use crate::storage::{Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub recipes: Arc<dyn RecipeStore>,
    pub mailer: Arc<dyn Mailer>,
    pub storage: Arc<dyn StorageClient>,
    pub chat: ChatClient,
}

impl AppState {
    /// Connects every backing service and runs pending migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::connect(&config).await?);
        store.migrate().await?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let mailer = mail::from_config(&config.mail)?;
        let chat = ChatClient::new(&config.chat)?;

        Ok(Self {
            config: Arc::new(config),
            users: store.clone(),
            recipes: store,
            mailer,
            storage,
            chat,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        crate::testing::fake_state().0
    }
}
