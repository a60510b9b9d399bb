//! The extraction pipeline.
//!
//! - [`identifier`] - selector-like labels for elements
//! - [`importance`] - which elements are worth keeping
//! - [`filter`] - resolved style to meaningful declarations
//! - [`rules`] - stylesheet rules to important rules, media queries, animations
//! - [`summary`] - color scheme, typography, layout and custom properties
//! - [`orchestrator`] - [`StyleExtractor`], which runs all of the above

pub mod filter;
pub mod identifier;
pub mod importance;
pub mod orchestrator;
pub mod rules;
pub mod summary;

pub use filter::{filter_element, filter_pseudo, filter_styles, DefaultStyleCache, FilterContext};
pub use identifier::identify;
pub use importance::ImportanceRules;
pub use orchestrator::StyleExtractor;
pub use rules::{RuleError, RuleLimits, RuleProcessor, SheetSummary};
