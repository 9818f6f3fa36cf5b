//! TOML session file.

use std::{path::Path, sync::Arc, time::Duration};

use glide_client::{RedbStore, SessionConfig, SlidingSyncBuilder};
use glide_core::{ConfigError, View, ViewBuilder};
use glide_proto::{ListFilters, RequiredStateField, RoomId, RoomSubscription, SortKey};
use serde::Deserialize;

use crate::error::CliError;

const DEFAULT_POLL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_STORE_KEY: &str = "default";

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_store_key() -> String {
    DEFAULT_STORE_KEY.to_owned()
}

/// Parsed session file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionFile {
    /// Homeserver base URL
    pub homeserver: String,
    /// Bearer token for the homeserver
    #[serde(default)]
    pub access_token: Option<String>,
    /// Long-poll timeout once caught up
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Back-off after a recoverable error
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Redb file for session snapshots
    #[serde(default)]
    pub store_path: Option<std::path::PathBuf>,
    /// Key the snapshot is stored under
    #[serde(default = "default_store_key")]
    pub store_key: String,
    /// Views, in file order
    #[serde(default, rename = "view")]
    pub views: Vec<ViewConfig>,
    /// Explicit room subscriptions
    #[serde(default, rename = "subscription")]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// How a view's ranges are managed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Ranges listed in the file
    #[default]
    Selective,
    /// Window growing by `batch_size` each cycle
    Growing,
}

/// One `[[view]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// Unique view name
    pub name: String,
    /// Sort keys; builder default when empty
    #[serde(default)]
    pub sort: Vec<SortKey>,
    /// Required state pairs
    #[serde(default)]
    pub required_state: Vec<RequiredStateField>,
    /// Timeline events per room
    #[serde(default)]
    pub timeline_limit: Option<u32>,
    /// Server-side filters
    #[serde(default)]
    pub filters: ListFilters,
    /// Range management
    #[serde(default)]
    pub mode: ViewMode,
    /// Growth step (growing mode)
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// Growth cap (growing mode)
    #[serde(default)]
    pub maximum: Option<u32>,
    /// Inclusive `[start, end]` pairs (selective mode)
    #[serde(default)]
    pub ranges: Vec<[u32; 2]>,
}

/// Default growth step when a growing view names none.
pub const DEFAULT_BATCH_SIZE: u32 = 20;

impl ViewConfig {
    /// Validate into a [`View`].
    pub fn build(&self) -> Result<View, ConfigError> {
        let mut builder = ViewBuilder::new(&self.name);
        if !self.sort.is_empty() {
            builder = builder.sort(self.sort.clone());
        }
        for field in &self.required_state {
            builder = builder.required_state(&field.event_type, &field.state_key);
        }
        if let Some(limit) = self.timeline_limit {
            builder = builder.timeline_limit(limit);
        }
        builder = builder.filters(self.filters.clone());

        builder = match self.mode {
            ViewMode::Selective => {
                let mut builder = builder.selective();
                for [start, end] in &self.ranges {
                    builder = builder.add_range(*start, *end);
                }
                builder
            },
            ViewMode::Growing => {
                if !self.ranges.is_empty() {
                    return Err(ConfigError::RangesManaged { view: self.name.clone() });
                }
                builder.growing(self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE), self.maximum)
            },
        };
        builder.build()
    }
}

/// One `[[subscription]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Room to subscribe to
    pub room_id: RoomId,
    /// Required state pairs
    #[serde(default)]
    pub required_state: Vec<RequiredStateField>,
    /// Timeline events
    #[serde(default)]
    pub timeline_limit: Option<u32>,
}

impl SessionFile {
    /// Read and parse a session file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| CliError::Read { path: path.to_owned(), source })?;
        Self::from_toml(&text)
    }

    /// Parse session file text.
    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(text)?)
    }

    /// Session for the bundled simulator: one growing view over everything
    /// and one selective view of DMs.
    pub fn simulated() -> Self {
        Self {
            homeserver: "http://sim.local".to_owned(),
            access_token: None,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            store_path: None,
            store_key: default_store_key(),
            views: vec![
                ViewConfig {
                    name: "all".to_owned(),
                    sort: Vec::new(),
                    required_state: Vec::new(),
                    timeline_limit: Some(1),
                    filters: ListFilters::default(),
                    mode: ViewMode::Growing,
                    batch_size: Some(DEFAULT_BATCH_SIZE),
                    maximum: None,
                    ranges: Vec::new(),
                },
                ViewConfig {
                    name: "dms".to_owned(),
                    sort: Vec::new(),
                    required_state: Vec::new(),
                    timeline_limit: Some(1),
                    filters: ListFilters { is_dm: Some(true), ..ListFilters::default() },
                    mode: ViewMode::Selective,
                    batch_size: None,
                    maximum: None,
                    ranges: vec![[0, 9]],
                },
            ],
            subscriptions: Vec::new(),
        }
    }

    /// Loop timing.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Session builder with every view, subscription and the store applied.
    ///
    /// Opens the snapshot store if one is configured.
    pub fn builder(&self) -> Result<SlidingSyncBuilder, CliError> {
        let mut builder =
            SlidingSyncBuilder::new(self.homeserver.clone()).config(self.session_config());
        for view in &self.views {
            builder = builder.add_view(view.build()?);
        }
        for sub in &self.subscriptions {
            let settings = RoomSubscription {
                required_state: sub.required_state.clone(),
                timeline_limit: sub.timeline_limit,
            };
            builder = builder.subscribe(sub.room_id.clone(), settings);
        }
        if let Some(path) = &self.store_path {
            let store = RedbStore::open(path)?;
            builder = builder.store(Arc::new(store), self.store_key.clone());
        }
        Ok(builder)
    }
}
