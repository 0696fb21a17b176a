pub mod backup;
pub mod catalog;
pub mod core;
pub mod plan;
pub mod selection;
