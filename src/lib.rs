//! Text Patcher: ordered find/replace patching of generated source files
//!
//! A document is read whole, run through an ordered list of edit rules, and
//! written back whole. Rules come in three kinds:
//!
//! - exact block replacement ([`EditRule::ReplaceBlock`])
//! - line-scan replacement between a start and an end marker
//!   ([`EditRule::LineScan`])
//! - replacement of everything from a marker to the end of the document
//!   ([`EditRule::ReplaceTail`])
//!
//! # Policies
//!
//! Every rule can miss its anchor. What happens next is an explicit
//! [`MatchPolicy`] chosen per rule: abort the run, warn and skip, or skip
//! silently. A run that aborts never writes.
//!
//! # Storage
//!
//! The engine is pure. Reading and writing go through a [`DocumentStore`]:
//! [`FileStore`] writes atomically (tempfile + fsync + rename), and
//! [`MemoryStore`] keeps everything in memory for tests.
//!
//! # Example
//!
//! ```
//! use text_patcher::{run, EditRule, MemoryStore, PatchRule, Patcher, RunMode};
//!
//! let patcher = Patcher::new(vec![
//!     PatchRule::new("rename", EditRule::replace_block("old_name", "new_name")),
//! ]);
//!
//! let mut store = MemoryStore::new("let old_name = 1;\n");
//! let summary = run(&mut store, &patcher, RunMode::Write).unwrap();
//! assert!(summary.written);
//! assert_eq!(store.content(), Some("let new_name = 1;\n"));
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod rule;
pub mod store;

// Re-exports
pub use config::{discover_rule_files, load_from_path, load_from_str, ConfigError, RuleSet};
pub use document::{Document, Fingerprint};
pub use engine::{PatchError, PatchReport, PatchRule, Patcher, RuleOutcome, RuleReport};
pub use rule::{
    Application, EditRule, MatchPolicy, Miss, NearMiss, Occurrence, RuleError,
    UnterminatedPolicy,
};
pub use store::{
    run, DocumentStore, FileStore, MemoryStore, RunError, RunMode, RunSummary, StoreError,
};
