pub mod bindless;
pub mod config;
pub mod container;
pub mod encode;
pub mod error;
pub mod heap;
pub mod memory;
pub mod queue;
pub mod submission;
pub mod sync;
