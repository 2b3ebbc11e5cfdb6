//! Build state shared across pipeline stages.
//!
//! - [`context`] - The image build context and its backing device

pub mod context;
