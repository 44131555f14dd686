//! File system primitives behind the transactional facade.
//!
//! [`action`] captures and reverses individual mutations; [`temp`] owns the
//! scratch directory those captures are written to.

pub mod action;
pub mod temp;

pub use action::CompensatingAction;
pub use temp::{TempStore, create_temp_directory, temp_file_name};
