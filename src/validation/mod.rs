/// Request value validators used by the data-access layer.

pub mod date_format;

pub use date_format::{is_date_format_matched, validate_date_format};
