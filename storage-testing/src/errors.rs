use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("test skipped: {reason}")]
    TestSkipped { reason: String },
    #[error("scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TestingError>;
