//! Stage handlers C7-C10, one module per queue.

pub mod archive;
pub mod cleanup;
pub mod parsing;
pub mod vectorize;

pub use archive::ArchiveHandler;
pub use cleanup::CleanupHandler;
pub use parsing::ParsingHandler;
pub use vectorize::VectorizationHandler;
