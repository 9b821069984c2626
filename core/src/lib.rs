pub mod config;
pub mod error;
pub mod fields;
pub mod index;
pub mod lexeme;
pub mod morphology;
pub mod persist;
pub mod store;
pub mod tokenizer;

pub use index::*;
