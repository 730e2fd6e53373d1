//! DOM reconciliation engine.
//!
//! Features describe what to enhance with a [`ReconcilerSpec`] and how with an [`Enhancer`];
//! the [`Reconciler`] keeps the page enhanced while third-party code keeps rewriting it, and
//! restores the original markup when the feature stops.

pub mod dom;
pub mod errors;
mod events;
pub mod journal;
pub mod memory;
pub mod reconciler;
pub mod selector;

pub use dom::{Dom, MutationKind, MutationRecord, NodeId, ObserveOptions, ObserverId};
pub use errors::{DomError, EnhanceError, ReconcilerError};
pub use journal::{DomJournal, JournalOp};
pub use memory::MemoryDom;
pub use reconciler::{
    Enhancer, Outcome, Reconciler, ReconcilerSpec, ReconcilerState, ReconcilerStats, ScanKind,
    ScanReport, DEFAULT_DEBOUNCE, MARKER_PREFIX,
};
pub use selector::Selector;
