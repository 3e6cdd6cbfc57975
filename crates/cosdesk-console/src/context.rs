use std::sync::Arc;

use cosdesk_client::{ApiClient, AuthClient, ConsoleApi, Notifier, RequestGateway};
use cosdesk_core::{AppResult, Config};
use cosdesk_storage::{create_storage, ObjectStorage};

use crate::guard::Router;
use crate::screens::{RecordsScreen, UsersScreen};
use crate::session::SessionStore;
use crate::upload::{PreviewRegistry, StagedFiles, Uploader};

/// Everything a front end needs, wired from configuration.
pub struct ConsoleContext {
    config: Config,
    api: ConsoleApi,
    auth: Arc<AuthClient>,
    session: SessionStore,
    storage: Arc<dyn ObjectStorage>,
    previews: PreviewRegistry,
}

impl ConsoleContext {
    pub async fn from_config(config: Config, notifier: Arc<dyn Notifier>) -> AppResult<Self> {
        let client = ApiClient::from_config(&config)?;
        let api = ConsoleApi::new(client.clone(), RequestGateway::new(notifier));
        let auth = Arc::new(AuthClient::new(client));
        let session = SessionStore::new(auth.clone(), Arc::new(api.clone()));
        let storage = create_storage(&config).await?;

        tracing::debug!(
            backend = %config.backend_url(),
            storage = %storage.backend_type(),
            environment = %config.environment,
            "Console context ready"
        );

        Ok(Self {
            config,
            api,
            auth,
            session,
            storage,
            previews: PreviewRegistry::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &ConsoleApi {
        &self.api
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn router(&self, location: &str) -> Router {
        Router::new(self.session.subscribe(), location)
    }

    pub fn records(&self) -> RecordsScreen {
        RecordsScreen::new(self.api.clone())
    }

    pub fn users(&self) -> UsersScreen {
        UsersScreen::new(self.api.clone())
    }

    pub fn staging(&self) -> StagedFiles {
        StagedFiles::new(self.previews.clone(), self.config.quick_paths().to_vec())
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(Arc::clone(&self.storage), self.api.clone())
    }
}
