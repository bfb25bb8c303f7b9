//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::{Backend, DEFAULT_BASE_URL};
use crate::error::Result;

/// User id sent when none is configured.
const DEFAULT_USER_ID: &str = "default";

/// Command-line arguments for the streamchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Backend origin.
    #[arrrg(optional, "Backend URL (default: http://localhost:8080/)", "URL")]
    pub base_url: Option<String>,

    /// User id sent with every request.
    #[arrrg(optional, "User id sent to the backend (default: default)", "ID")]
    pub user_id: Option<String>,

    /// Connect timeout in seconds.
    #[arrrg(optional, "Seconds to wait for a connection (default: none)", "SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log session events to stderr.
    #[arrrg(flag, "Log every session event to stderr")]
    pub verbose: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend origin.
    pub base_url: String,

    /// User id sent with every request.
    pub user_id: String,

    /// How long to wait for a connection; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to log session events to stderr.
    pub verbose: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Backend: http://localhost:8080/
    /// - User id: default
    /// - Color: enabled
    /// - Verbose: disabled
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            connect_timeout: None,
            use_color: true,
            verbose: false,
        }
    }

    /// Sets the backend origin.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Enables event logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Builds the HTTP backend this configuration points at.
    pub fn backend(&self) -> Result<Backend> {
        Backend::with_options(Some(&self.base_url), self.connect_timeout)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            base_url: args.base_url.unwrap_or(defaults.base_url),
            user_id: args
                .user_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.user_id),
            connect_timeout: args.connect_timeout_secs.map(Duration::from_secs),
            use_color: !args.no_color,
            verbose: args.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert_eq!(config.base_url, "http://localhost:8080/");
        assert_eq!(config.user_id, "default");
        assert!(config.connect_timeout.is_none());
        assert!(config.use_color);
        assert!(!config.verbose);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::from(ChatArgs::default());
        assert_eq!(config, ChatConfig::new());
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            base_url: Some("http://assistant.internal:9000".to_string()),
            user_id: Some("alice".to_string()),
            connect_timeout_secs: Some(5),
            no_color: true,
            verbose: true,
        };
        let config = ChatConfig::from(args);
        assert_eq!(config.base_url, "http://assistant.internal:9000");
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert!(!config.use_color);
        assert!(config.verbose);
    }

    #[test]
    fn blank_user_id_falls_back() {
        let args = ChatArgs {
            user_id: Some("  ".to_string()),
            ..ChatArgs::default()
        };
        assert_eq!(ChatConfig::from(args).user_id, "default");
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_base_url("http://127.0.0.1:8080")
            .with_user_id("bob")
            .with_connect_timeout(Some(Duration::from_secs(2)))
            .without_color()
            .verbose();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.user_id, "bob");
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(2)));
        assert!(!config.use_color);
        assert!(config.verbose);

        let backend = config.backend().unwrap();
        assert_eq!(backend.base_url().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(ChatConfig::new().with_base_url("not a url").backend().is_err());
    }
}
