use thiserror::Error;

/// Failures raised by the estimators, the summarizer and the model book.
///
/// Every variant is returned to the immediate caller. Nothing is retried:
/// a fit is deterministic for fixed inputs and config, so running it again
/// would fail the same way.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(
        "unsupported model kind '{0}': expected one of 'count', 'success_rate', 'xSpA', 'xSp90' or 'adj_pass'"
    )]
    UnsupportedModelKind(String),

    #[error("check inputs: {0}")]
    InputShape(String),

    #[error("{model} fit failed: {detail}")]
    NumericalFit { model: &'static str, detail: String },

    #[error("player {index} was not observed by this model")]
    UnknownPlayer { index: usize },

    #[error("no player named '{0}' in the table")]
    UnknownPlayerName(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("a model labelled '{0}' already exists")]
    DuplicateLabel(String),

    #[error("no model labelled '{0}'")]
    UnknownLabel(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize model artifact: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn shape(detail: impl Into<String>) -> Self {
        Self::InputShape(detail.into())
    }

    pub fn numerical(model: &'static str, detail: impl Into<String>) -> Self {
        Self::NumericalFit {
            model,
            detail: detail.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
