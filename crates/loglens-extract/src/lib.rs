//! Log extraction & compression pipeline: C1 Secret Sanitizer, C2 Token
//! Counter, C3 Log Compressor, C4 Failure Extractor.

pub mod compress;
pub mod extract;
pub mod sanitize;
pub mod signals;
pub mod tokens;

pub use compress::{compress, CompressedLog};
pub use extract::extract;
pub use sanitize::sanitize;
pub use tokens::count as count_tokens;
