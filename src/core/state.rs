//! Application state

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiClient, Transport};
use crate::config::Config;
use crate::session::{LiveUpdateCoordinator, SessionBackend};
use crate::store::{MessagesStore, SessionsStore};
use crate::vnc::{RemoteDesktop, RemoteDesktopApi};

/// Everything a front end needs, wired from one config
pub struct AppState {
    pub config: Config,
    pub api: Arc<ApiClient>,
    pub sessions: SessionsStore,
    pub messages: MessagesStore,
    pub remote_desktop: RemoteDesktop,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let transport = Transport::with_options(&config.api.base_url, config.transport_options())
            .context("Failed to build HTTP client")?;
        let api = Arc::new(ApiClient::with_transport(transport));

        let backend: Arc<dyn SessionBackend> = api.clone();
        let coordinator = Arc::new(LiveUpdateCoordinator::with_settings(
            backend.clone(),
            config.update_settings(),
        ));
        let desktop_api: Arc<dyn RemoteDesktopApi> = api.clone();

        Ok(Self {
            sessions: SessionsStore::new(backend.clone()),
            messages: MessagesStore::new(coordinator, backend),
            remote_desktop: RemoteDesktop::with_settings(
                desktop_api,
                config.remote_desktop_settings(),
            ),
            api,
            config,
        })
    }
}
