//! Token creation collaborators
//!
//! The queue never builds tokens itself. It asks a [`TokenFactory`], which in
//! the reference setup validates against a [`TokenCatalog`].

use async_trait::async_trait;
use chrono::Utc;
use ledger_core::{OwnerId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::types::TokenSpec;

/// Capabilities of a token type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTypeInfo {
    /// May be minted
    pub mintable: bool,
    /// May change owner
    pub transferable: bool,
    /// May be destroyed
    pub burnable: bool,
}

/// Token factory rejection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Type not in the catalog
    #[error("unknown token type '{0}'")]
    UnknownType(String),

    /// Type exists but cannot be minted
    #[error("token type '{0}' is not mintable")]
    NotMintable(String),

    /// Amount must be positive
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Owner missing
    #[error("owner is empty")]
    EmptyOwner,

    /// Any other producer-side rejection
    #[error("{0}")]
    Rejected(String),
}

/// Token type lookup
#[async_trait]
pub trait TokenCatalog: Send + Sync {
    /// Describe a token type, if known
    async fn describe(&self, token_type: &str) -> Option<TokenTypeInfo>;
}

/// Creates immutable tokens from specs
#[async_trait]
pub trait TokenFactory: Send + Sync {
    /// Create a token or reject the spec
    async fn create_token(&self, spec: &TokenSpec) -> Result<Token, ValidationError>;
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    types: HashMap<String, TokenTypeInfo>,
}

impl StaticCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token type
    pub fn with_type(mut self, token_type: impl Into<String>, info: TokenTypeInfo) -> Self {
        self.types.insert(token_type.into(), info);
        self
    }

    /// Catalog with a few common types
    pub fn standard() -> Self {
        let fungible = TokenTypeInfo {
            mintable: true,
            transferable: true,
            burnable: true,
        };
        Self::new()
            .with_type("gold", fungible)
            .with_type("silver", fungible)
            .with_type(
                "badge",
                TokenTypeInfo {
                    mintable: true,
                    transferable: false,
                    burnable: false,
                },
            )
            .with_type(
                "genesis",
                TokenTypeInfo {
                    mintable: false,
                    transferable: true,
                    burnable: false,
                },
            )
    }
}

#[async_trait]
impl TokenCatalog for StaticCatalog {
    async fn describe(&self, token_type: &str) -> Option<TokenTypeInfo> {
        self.types.get(token_type).copied()
    }
}

/// Factory that validates against a catalog and stamps tokens immutable
#[derive(Clone)]
pub struct CatalogTokenFactory {
    catalog: Arc<dyn TokenCatalog>,
}

impl std::fmt::Debug for CatalogTokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogTokenFactory").finish_non_exhaustive()
    }
}

impl CatalogTokenFactory {
    /// Create factory
    pub fn new(catalog: Arc<dyn TokenCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl TokenFactory for CatalogTokenFactory {
    async fn create_token(&self, spec: &TokenSpec) -> Result<Token, ValidationError> {
        let info = self
            .catalog
            .describe(&spec.token_type)
            .await
            .ok_or_else(|| ValidationError::UnknownType(spec.token_type.clone()))?;

        if !info.mintable {
            return Err(ValidationError::NotMintable(spec.token_type.clone()));
        }
        if spec.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(spec.amount));
        }
        if spec.owner.trim().is_empty() {
            return Err(ValidationError::EmptyOwner);
        }

        Ok(Token {
            id: Uuid::now_v7(),
            token_type: spec.token_type.clone(),
            owner: OwnerId::new(spec.owner.clone()),
            value: spec.amount,
            timestamp: Utc::now(),
            immutable: true,
            metadata: spec.metadata.clone(),
        })
    }
}
