// Utilities shared across the view modules

pub mod audit;

// Copy buffer for content export
pub const EXPORT_BUFFER_SIZE: usize = 32 * 1024;
