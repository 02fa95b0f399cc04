#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconError {
    /// `--strategy` value not in uuid|email|domain|name|all.
    #[error("unknown strategy '{0}' (expected uuid, email, domain, name or all)")]
    UnknownStrategy(String),
    /// Alias table maps a column onto itself or onto another alias.
    #[error("alias table for '{entity_type}': {message}")]
    InvalidAlias { entity_type: String, message: String },
}
