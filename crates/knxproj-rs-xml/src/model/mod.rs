// crates/knxproj-rs-xml/src/model/mod.rs

//! Internal definition model built from manufacturer and master data documents.
//!
//! These are the shared, read-only templates owned by the reference index.
//! Nothing in here is exposed publicly; the resolvers map them onto the
//! public `types`.

pub(crate) mod application;
pub(crate) mod hardware;
