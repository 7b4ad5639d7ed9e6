pub mod chunker;
pub mod cleaner;
pub mod parser;

pub use chunker::RecursiveChunker;
pub use cleaner::{clean_text, prepare_document};
pub use parser::{extract_pdf_file, extract_pdf_text};
