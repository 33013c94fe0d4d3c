#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod advice;
pub mod error;
pub mod object;
pub mod patcher;
pub mod rollback;
pub mod testing;
pub mod weave;
pub mod wrapper;

pub use advice::{Advice, Aspect};
pub use error::{CallError, Exception, RollbackError, WeaveError};
pub use object::{Args, Runtime, Value};
pub use rollback::{Rollback, RollbackGuard};
pub use weave::{weave, Methods, Target, WeaveOptions, Weaver};
