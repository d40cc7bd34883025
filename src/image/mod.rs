//! Container image references and content digests

pub mod digest;
pub mod reference;

pub use digest::Digest;
pub use reference::ImageRef;
