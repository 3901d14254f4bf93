//! Chart query compilation for Quarry.
//!
//! This crate turns a stored chart definition into SQL text:
//! - **Field specs**: decoding of the stored axis configuration (`field_spec`).
//! - **Compiler**: SELECT/FROM/WHERE/GROUP BY/ORDER BY/LIMIT assembly (`compiler`).
//! - **Literals**: every place a runtime value reaches SQL text (`literal`).
//!
//! Nothing in here performs I/O.
pub mod compiler;
pub mod error;
pub mod field_spec;
pub mod literal;
pub mod sanitize;

pub use compiler::{CompiledQuery, Compiler, CompilerOptions};
pub use error::CompileError;
pub use field_spec::{Aggregate, Dimension, FieldSpec, Measure, SortDirection};
