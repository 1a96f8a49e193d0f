//! Cryptonite Core - URL classification and browsing decisions.
//!
//! This crate holds everything the extension background decides:
//!
//! - Which URLs are eligible for classification ([`domain_policy`])
//! - Local short-circuits: known domains and access-anyway overrides ([`cache`])
//! - The remote classification client ([`api`])
//! - Verdict selection and category policy ([`verdict`])
//! - Trial and paid eligibility ([`subscription`])
//! - The event-driven decision engine ([`engine`])
//!
//! Browser effects go through the [`platform::Platform`] trait and state
//! through [`store::KeyValueStore`], so the engine runs the same under a
//! real host, the bridge server, or tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cryptonite_core::{CheckContext, DecisionEngine, DirectiveQueue, EngineConfig, PropertyStore, Tab};
//!
//! let queue = Arc::new(DirectiveQueue::new("chrome-extension://abc/"));
//! let mut engine = DecisionEngine::new(EngineConfig::default(), PropertyStore::in_memory(), queue.clone());
//!
//! let tab = Tab::new(1, "https://example.com/");
//! if let Some(pending) = engine.begin_tab_check(&tab, CheckContext::PAGE_COMPLETE).into_lookup() {
//!     // Send `pending.request` to the classifier, then:
//!     engine.complete_tab_check(pending, Ok(None));
//! }
//! ```

pub mod annotation;
pub mod api;
pub mod cache;
pub mod config;
pub mod domain_policy;
pub mod engine;
pub mod history;
pub mod known_domains;
pub mod messages;
pub mod platform;
pub mod store;
pub mod subscription;
pub mod verdict;

pub use annotation::{Annotation, LinkNode, PageAnnotator};
pub use api::{
    ApiError, CheckRequest, ClassificationApi, ClassificationResponse, HttpClassifier,
    CLIENT_VERSION,
};
pub use cache::ClassificationCache;
pub use config::{ApiConfig, ConfigError, EngineConfig, SubscriptionType};
pub use domain_policy::{extract_domain_parts, DomainParts};
pub use engine::{
    CheckContext, Clock, DecisionEngine, InstallReason, LinkLookup, PendingLookup, SystemClock,
    TabCheck,
};
pub use history::HistoryEntry;
pub use known_domains::KnownDomainsMatcher;
pub use messages::{AnnotationFlags, ExtensionMessage, LinkReport, SiteReport, TabMessage};
pub use platform::{ActionState, Directive, DirectiveQueue, Platform, Tab, TabId, TabStatus};
pub use store::{KeyValueStore, MemoryStore, PropertyStore, ReadError};
pub use subscription::{SubscriptionGate, SubscriptionStatus};
pub use verdict::{CategoryPolicy, PlaceFound, Verdict};
