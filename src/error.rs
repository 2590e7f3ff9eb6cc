use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid quarter: {0}")]
    InvalidQuarter(String),

    #[error("could not infer {component} from source reference: {source_ref}")]
    #[diagnostic(help("rename the file to include e.g. `Quarter-3` and `2023-24`"))]
    AmbiguousPeriod {
        component: &'static str,
        source_ref: String,
    },

    #[error("missing config file bedocc.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("unknown schema mapping version: {0}")]
    #[diagnostic(help("known versions: kh03-v1"))]
    UnknownSchemaVersion(String),

    #[error("failed to open workbook {path}: {message}")]
    WorkbookOpen { path: PathBuf, message: String },

    #[error("failed to read worksheet {sheet}: {message}")]
    SheetRead { sheet: String, message: String },

    #[error("workbook has no worksheets")]
    EmptyWorkbook,

    #[error("worksheet {sheet} has no header at row {row}")]
    HeaderNotFound { sheet: String, row: usize },

    #[error("could not find all required columns in {sheet}; missing: {}", missing.join(", "))]
    UnresolvedColumns { sheet: String, missing: Vec<String> },

    #[error("batch spans more than one period: {first} and {other}")]
    MixedPeriods { first: String, other: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("source request failed: {0}")]
    Fetch(String),

    #[error("source returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl IngestError {
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IngestError::WorkbookOpen { .. }
                | IngestError::SheetRead { .. }
                | IngestError::EmptyWorkbook
                | IngestError::HeaderNotFound { .. }
                | IngestError::UnresolvedColumns { .. }
                | IngestError::AmbiguousPeriod { .. }
        )
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Database(err.to_string())
    }
}
