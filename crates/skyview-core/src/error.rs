//! Top-level error types for the Skyview application.
//!
//! Domain crates keep their own precise error enums; this module is where they
//! meet the rendering surface, which only ever needs a short, non-technical
//! message plus the detail for logs.

use thiserror::Error;

/// Everything that can stop a dashboard run.
///
/// `Display` carries the detail for logs; [`AppError::user_message`] is what
/// gets shown.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// A domain failure already classified by the crate that produced it.
    #[error("{detail}")]
    Service {
        user_message: &'static str,
        detail: String,
    },

    #[error("file access: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn service(user_message: &'static str, detail: impl Into<String>) -> Self {
        AppError::Service {
            user_message,
            detail: detail.into(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Service { user_message, .. } => *user_message,
            AppError::Io(_) => "Could not read or write local data.",
            AppError::Other(_) => "Something went wrong. Please try again.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more blocking validation problems, summarised.
    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("unreadable config.toml: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Settings are invalid. Check config.toml.",
            ConfigError::ParseError(_) => "config.toml could not be read. Check its syntax.",
        }
    }
}
