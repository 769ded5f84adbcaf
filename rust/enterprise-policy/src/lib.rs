//! Enterprise gateway policy resources: their CRDs, the rules that decide whether a policy may be
//! attached, and how policies at different attachment levels combine.

pub mod attachment;
pub mod cel;
pub mod client;
pub mod crd;
pub mod documents;
pub mod extensions;
pub mod merge;
pub mod validation;
