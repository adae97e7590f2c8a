// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::fetch::QueryParseError;

/// Failures that end a render pass of the control. None of them are fatal to
/// the control instance: the next input change starts over.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup target entity is not configured")]
    ConfigMissing,
    #[error("resolve options for {entity}: {message}")]
    Resolution { entity: String, message: String },
    #[error(transparent)]
    QueryParse(#[from] QueryParseError),
}

impl LookupError {
    pub fn resolution(entity: &str, error: impl std::fmt::Display) -> Self {
        Self::Resolution {
            entity: entity.to_owned(),
            message: error.to_string(),
        }
    }

    pub fn from_anyhow(entity: &str, error: &anyhow::Error) -> Self {
        Self::Resolution {
            entity: entity.to_owned(),
            message: format!("{error:#}"),
        }
    }
}
