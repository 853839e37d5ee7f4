pub mod raw;
pub mod validated;

pub use raw::RawSettings;
pub use validated::{ValidatedSettings, ValidatedSettingsBuilder};
