/// Business logic services layer
pub mod export;
pub mod fetcher;
pub mod filter;
pub mod markers;
pub mod reference;
pub mod session;
pub mod url_state;
pub mod viewport;

#[cfg(test)]
pub mod testing;

pub use export::ExportFormat;
pub use reference::ReferenceLoader;
pub use session::{Action, LocateFailure, SessionOptions, SessionRegistry};
