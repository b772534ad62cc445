pub mod draft;
pub mod normalize;
pub mod priors;
pub mod signals;
pub mod synthesize;

pub use draft::{AbvField, ListingDraft};
pub use normalize::{SchemaViolation, normalize_listing};
pub use signals::{SignalExtraction, extract_signals};
pub use synthesize::{SynthesisError, synthesize_listing};
