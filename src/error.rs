use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt data: {0}")]
    CorruptData(String),
    #[error("duplicate key in shard: {0}")]
    DuplicateKey(String),
    #[error("key count {keys} does not match offset count {offsets}")]
    LengthMismatch { keys: usize, offsets: usize },
    #[error("read of {length} bytes at {start} exceeds store of {store_len} bytes")]
    OutOfBounds {
        start: u64,
        length: u64,
        store_len: u64,
    },
    #[error("record error at line {line}: {detail}")]
    Record { line: u64, detail: String },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(detail: impl Into<String>) -> Self {
        IndexError::CorruptData(detail.into())
    }
}

impl From<csv::Error> for IndexError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(source) => IndexError::Io {
                path: PathBuf::new(),
                source,
            },
            kind => IndexError::Record {
                line,
                detail: format!("{kind:?}"),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
