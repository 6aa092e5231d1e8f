//! IO modules - side effects (remote transfer, archive extraction)

pub mod download;
pub mod extract;
