//! Page augmentations for the GTM debugging surfaces.
//!
//! Each feature is a [`ReconciledFeature`]: an optional stylesheet plus one or more
//! reconcilers from `gtm-lens-dom-reconciler`. [`BuiltinFeatures`] builds them from catalog
//! descriptors and [`FeatureRegistry`] holds the live ones for a page.

pub mod consent_monitor;
pub mod errors;
pub mod feature;
pub mod json_format;
pub mod markup;
pub mod preview_filter;
pub mod registry;
pub mod style;
pub mod tag_status;
pub mod tag_type;
pub mod url_format;

pub use errors::FeatureError;
pub use feature::{
    BuiltinFeatures, CommandHandler, CommandOutcome, Feature, FeatureFactory, ReconciledFeature,
};
pub use preview_filter::FilterState;
pub use registry::FeatureRegistry;
pub use style::{inject_style, remove_style, InjectedStyle, StyleSheet};
