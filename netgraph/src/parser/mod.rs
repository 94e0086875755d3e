pub mod kicad;
pub mod schema;
pub mod sexp;

// Re-export for convenience
pub use kicad::KicadParser;
pub use schema::*;
pub use sexp::{ParseError, SExp, SExpParser, Span};
