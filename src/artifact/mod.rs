//! Artifact builders.
//!
//! - [`disk`] - Partitioned, formatted, and mounted disk images plus the fstab
//!   and kernel root parameter derived from them

pub mod disk;
