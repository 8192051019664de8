pub mod asset;
pub mod suggestion;

pub use asset::UploadedAsset;
pub use suggestion::{Preferences, SuggestionRequest, SuggestionResponse};
