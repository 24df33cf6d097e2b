use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Merge,
    Clean,
    Convert,
    Split,
    ExportExcel,
    ExportCsv,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Merge => "merge",
            Self::Clean => "clean",
            Self::Convert => "convert",
            Self::Split => "split",
            Self::ExportExcel => "excel export",
            Self::ExportCsv => "csv export",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read PDF '{}': {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("no tables found in '{}'", path.display())]
    NoTablesFound { path: PathBuf },

    #[error("invalid chunk budget: {0}")]
    InvalidBudget(String),

    #[error("failed to write '{}': {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: BoxedError,
    },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("invalid table: {0}")]
    InvalidTable(String),

    #[error("failed to load configuration from '{}': {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("{stage} stage failed for '{}'", input.display())]
    Stage {
        stage: Stage,
        input: PathBuf,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub(crate) fn write(path: &Path, source: impl Into<BoxedError>) -> Self {
        Self::WriteError {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn in_stage(self, stage: Stage, input: &Path) -> Self {
        Self::Stage {
            stage,
            input: input.to_path_buf(),
            source: Box::new(self),
        }
    }

    /// The error that started the failure, with any stage wrapping removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Everything aborts a run except an extraction that found nothing.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), Self::NoTablesFound { .. })
    }
}
