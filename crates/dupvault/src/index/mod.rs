pub mod dedup;
pub mod hasher;
pub mod scanner;

pub use dedup::{DuplicateIndex, Observation};
pub use hasher::{hash_file, hash_file_with_progress, verify_hash, HashCache};
pub use scanner::{build_ignore_set, enumerate_files, EnumerateOptions, Enumeration};
