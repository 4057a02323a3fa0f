// Shared building blocks: error modeling and exit-code mapping.
pub mod error;
