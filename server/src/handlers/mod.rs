//! Request handlers for document and subscription operations.

mod documents;
mod websocket;

pub use documents::*;
pub use websocket::*;
