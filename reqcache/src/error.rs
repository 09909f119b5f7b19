use thiserror::Error;

/// A `Result` typedef to use with the [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session pipeline.
///
/// Cache-Control/Set-Cookie/Vary parse failures are deliberately **not**
/// represented here; the managers fail open on those and only log at
/// `trace`. Only conditions that must abort the pipeline, or that wrap a
/// failure from an external collaborator, are errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A memoized redirect chain cycled back on itself.
    #[error("too many redirects: cycle detected at {url}")]
    TooManyRedirects {
        /// The URL at which the cycle was detected.
        url: String,
    },
    /// The underlying [`Transport`](crate::Transport) failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// A URL could not be parsed.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// A cache entry failed to (de)serialize to its stored byte form.
    #[error(transparent)]
    Encoding(#[from] Box<bincode::ErrorKind>),
}
