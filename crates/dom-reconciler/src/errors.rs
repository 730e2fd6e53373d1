use gtm_lens_core_types::LensError;
use thiserror::Error;

use crate::dom::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("html parse error: {0}")]
    HtmlParse(String),
}

/// Failure of one enhancer call. The reconciler logs it and moves on to the next element.
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// Third-party markup no longer has the structure the enhancer expects.
    #[error("unexpected markup: {0}")]
    ShapeMismatch(String),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("{0}")]
    Failed(String),
}

impl EnhanceError {
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("no observation root: {0}")]
    NoRoot(String),
    #[error("reconciler must be started inside a tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl From<ReconcilerError> for LensError {
    fn from(err: ReconcilerError) -> Self {
        LensError::new(err.to_string())
    }
}
