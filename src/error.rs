//! Error taxonomy and diagnostics
//!
//! Every failure surfaced by the core carries a stable string code so
//! embedding layers (CLI, LSP, MCP) can map it without parsing messages.
//! The set of codes is closed: an unknown code reaching a caller is a bug.

use thiserror::Error;

/// Top-level error type for the raven core.
#[derive(Debug, Error)]
pub enum RavenError {
    // Mutation preconditions
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not unique: {0}")]
    NotUnique(String),

    #[error("protected path: {0}")]
    ProtectedPath(String),

    #[error("path escapes the vault: {0}")]
    OutOfVault(String),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    // Query failures
    #[error("query parse error: {0}")]
    QueryParse(String),

    #[error("query validation error: {0}")]
    QueryValidation(String),

    #[error("unknown name in query: {0}")]
    UnknownName(String),

    // Configuration / schema
    #[error("schema error: {0}")]
    Schema(String),

    #[error("config error: {0}")]
    Config(String),

    // Storage
    #[error("index corrupt ({0}); run `rvn reindex --full` to rebuild")]
    IndexCorrupt(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl RavenError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            RavenError::NotFound(_) => "not_found",
            RavenError::Conflict(_) => "conflict",
            RavenError::NotUnique(_) => "not_unique",
            RavenError::ProtectedPath(_) => "protected_path",
            RavenError::OutOfVault(_) => "out_of_vault",
            RavenError::MissingFields(_) => "missing_required_field",
            RavenError::QueryParse(_) => "parse_error",
            RavenError::QueryValidation(_) => "validation_error",
            RavenError::UnknownName(_) => "unknown_name",
            RavenError::Schema(_) => "schema_error",
            RavenError::Config(_) => "config_error",
            RavenError::IndexCorrupt(_) => "index_corrupt",
            RavenError::Database(_) => "index_error",
            RavenError::Serialization(_) => "serialization_error",
            RavenError::Io(_) => "io_error",
            RavenError::Cancelled => "cancelled",
        }
    }
}

/// Convenience Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RavenError>;

/// What produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Closed set of diagnostic kinds emitted by the parser, validator,
/// resolver, and integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    // Parse
    MalformedFrontmatter,
    MalformedTypedecl,
    MalformedTrait,
    MalformedReference,
    // Schema
    UnknownType,
    UndefinedTrait,
    UnknownField,
    UnknownFrontmatterKey,
    InvalidEnumValue,
    OutOfRange,
    MissingRequiredField,
    MissingRequiredTrait,
    WrongRefTargetType,
    InvalidFieldValue,
    // Resolution
    MissingReference,
    AmbiguousReference,
    DuplicateAlias,
    AliasCollision,
    DuplicateId,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::MalformedFrontmatter => "malformed_frontmatter",
            DiagnosticKind::MalformedTypedecl => "malformed_typedecl",
            DiagnosticKind::MalformedTrait => "malformed_trait",
            DiagnosticKind::MalformedReference => "malformed_reference",
            DiagnosticKind::UnknownType => "unknown_type",
            DiagnosticKind::UndefinedTrait => "undefined_trait",
            DiagnosticKind::UnknownField => "unknown_field",
            DiagnosticKind::UnknownFrontmatterKey => "unknown_frontmatter_key",
            DiagnosticKind::InvalidEnumValue => "invalid_enum_value",
            DiagnosticKind::OutOfRange => "out_of_range",
            DiagnosticKind::MissingRequiredField => "missing_required_field",
            DiagnosticKind::MissingRequiredTrait => "missing_required_trait",
            DiagnosticKind::WrongRefTargetType => "wrong_ref_target_type",
            DiagnosticKind::InvalidFieldValue => "invalid_field_value",
            DiagnosticKind::MissingReference => "missing_reference",
            DiagnosticKind::AmbiguousReference => "ambiguous_reference",
            DiagnosticKind::DuplicateAlias => "duplicate_alias",
            DiagnosticKind::AliasCollision => "alias_collision",
            DiagnosticKind::DuplicateId => "duplicate_id",
        }
    }

    /// Default severity; `--strict` promotes warnings at the caller.
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnknownFrontmatterKey
            | DiagnosticKind::UndefinedTrait
            | DiagnosticKind::MissingReference
            | DiagnosticKind::AmbiguousReference => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A single issue found in a file, attached to a line when known.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub file: String,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, file: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            severity: kind.default_severity(),
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.line {
            Some(line) => write!(f, "{}: {}:{} [{}] {}", sev, self.file, line, self.kind.as_str(), self.message),
            None => write!(f, "{}: {} [{}] {}", sev, self.file, self.kind.as_str(), self.message),
        }
    }
}
