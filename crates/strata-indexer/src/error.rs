use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to load the Java grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parser produced no tree for {path}")]
    Syntax { path: String },
}
