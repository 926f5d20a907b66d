//! Media catalog core: the record store and the local asset pipeline.
//!
//! Entries (title, description, poster, screenshots, tags) live in a JSON
//! document. Their images are copied into a managed `copies/` directory and
//! rendered into `thumbnails/`; both directories are kept in step with the
//! catalog as entries are created, edited and deleted.

pub mod assets;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;

pub use assets::lifecycle::AssetLifecycle;
pub use config::CatalogConfig;
pub use error::{AssetError, StoreError, ValidationError};
pub use state::data::{Entry, EntryDraft, EntryPatch};
pub use state::library::Library;
