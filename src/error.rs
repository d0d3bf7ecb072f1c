use thiserror::Error;

/// Failures surfaced by the rendering core. I/O problems during a render
/// are logged and skipped; only setup-time configuration problems and the
/// explicit save-on-completion path return these to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("film check failed: {what} expected {expected}, found {found}")]
    FilmMismatch {
        what: &'static str,
        expected: i64,
        found: i64,
    },

    #[error("not a film file: bad magic")]
    FilmMagic,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Error {
        Error::Config(message.into())
    }
}
