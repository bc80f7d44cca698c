//! Error types for `logbook-core`.

use thiserror::Error;

use crate::entity::EntityRef;

#[derive(Debug, Error)]
pub enum Error {
  /// A raw document value is corrupt or carries an unknown discriminator.
  #[error("malformed document: {0}")]
  Format(String),

  /// A mention or backlink points at an entity that no longer resolves.
  #[error("unresolvable reference: {0}")]
  Reference(EntityRef),

  #[error("concurrent edge mutation detected on {from} -> {to}")]
  EdgeConflict { from: EntityRef, to: EntityRef },

  #[error("entity not found: {0}")]
  NotFound(EntityRef),

  #[error("relabel for {0} has no replacement label")]
  RelabelMismatch(EntityRef),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error into [`Error::Store`].
  pub fn store<E>(error: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(error))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
