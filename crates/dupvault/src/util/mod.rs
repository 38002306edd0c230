pub mod format;
pub mod progress;

pub use format::{format_bytes, format_duration, format_rate, format_timestamp, short_hash};
pub use progress::{create_progress_bar, create_spinner};
