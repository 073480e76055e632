//! Source backed by a local directory tree of pre-rendered tiles.

mod source;

pub use source::FileSource;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    TemplateError(#[from] crate::tiles::TemplateError),

    #[error("Cannot read tile file {1}: {0}")]
    IoError(#[source] std::io::Error, String),
}
