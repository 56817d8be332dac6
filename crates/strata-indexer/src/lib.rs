//! Java source parsing into structural graphs

pub mod error;
pub mod extractor;
pub mod symbols;
pub mod java;


pub use error::ParseError;
pub use extractor::{FileExtraction, JavaExtractor};
pub use java::JavaParser;
