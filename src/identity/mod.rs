pub mod document;
pub mod resolver;

pub use document::DidDocument;
pub use resolver::{Identity, IdentityError, IdentityResolver};
