pub mod studio;
pub mod whitewash;

pub use studio::{EditProvider, EditedImage, StudioNormalizer, StudioOutcome, providers_from_config};
