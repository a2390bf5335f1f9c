//! Pattern recognition: C5 Pattern Store, C6 Pattern Matcher, C7 Fix
//! Template Store, C8 Fix Generator.

pub mod generator;
pub mod matcher;
pub mod pattern_store;
pub mod template_store;
pub mod versioned_store;

pub use generator::generate_suggestions;
pub use matcher::match_failures;
pub use pattern_store::{CompiledPattern, PatternIndex, PatternStore};
pub use template_store::{TemplateIndex, TemplateStore};
