pub mod catalog;
pub mod domain;
pub mod error;
pub mod events;
pub mod protocol;
pub mod timestamp;
