//! Session file loading for the `glide` binary.
//!
//! A session file is TOML describing the homeserver, credentials, loop
//! timing, an optional snapshot store and the views and room subscriptions
//! to sync:
//!
//! ```toml
//! homeserver = "https://matrix.example.org"
//! access_token = "syt_..."
//! poll_timeout_ms = 30000
//! store_path = "glide.redb"
//!
//! [[view]]
//! name = "all"
//! sort = ["by_recency", "by_name"]
//! mode = "growing"
//! batch_size = 20
//!
//! [[view]]
//! name = "dms"
//! ranges = [[0, 19]]
//! filters = { is_dm = true }
//!
//! [[subscription]]
//! room_id = "!abc:example.org"
//! timeline_limit = 10
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{SessionFile, SubscriptionConfig, ViewConfig, ViewMode};
pub use error::CliError;
