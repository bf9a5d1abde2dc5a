pub mod backend;
pub mod git;
pub mod unified;

pub use crate::backend::{VcsBackend, VcsError};
pub use crate::git::GitBackend;
