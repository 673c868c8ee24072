use thiserror::Error;
use tracing::error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

/// Closed error taxonomy. Every terminal condition carries the byte offset
/// at which it was detected; there is deliberately no `Warning` variant
/// here — non-fatal conditions (ASCII decode fallback, unfinished manager
/// stubs, an unrecognized `other` tag) are only ever observed through
/// `tracing`, never through `Result::Err`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad magic at offset {offset}")]
    BadMagic { offset: u64 },
    #[error("short read at offset {offset}: {source}")]
    ShortRead { offset: u64, source: std::io::Error },
    #[error("unsupported {what} (version {version:?}) at offset {offset}")]
    Unsupported {
        what: String,
        version: Option<i32>,
        offset: u64,
    },
    #[error("unknown data manager {name:?} at offset {offset}")]
    UnknownManager { name: String, offset: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn unsupported(what: impl Into<String>, offset: u64) -> Self {
        let what = what.into();
        error!(offset, %what, "unsupported input");
        Error::Unsupported {
            what,
            version: None,
            offset,
        }
    }

    pub(crate) fn unsupported_version(what: impl Into<String>, version: i32, offset: u64) -> Self {
        let what = what.into();
        error!(offset, version, %what, "unsupported version");
        Error::Unsupported {
            what,
            version: Some(version),
            offset,
        }
    }
}
