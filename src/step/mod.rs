//! Build steps recorded across invocations
//!
//! One invocation of the tool describes one build step (compile, archive
//! or link). The step is captured as a [`StepRecord`], stored under the
//! name produced by its [`StepKey`], and read back when the Makefile is
//! assembled.

pub mod key;
pub mod recipe;
pub mod record;

pub use key::{StepKey, SIDECAR_EXTENSION};
pub use recipe::{Recipe, UnknownRecipe};
pub use record::StepRecord;
