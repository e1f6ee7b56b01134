//! Periodic media uploader.
//!
//! Scans an [`ItemSource`] on a fixed interval and sends framing lines for
//! items it has not sent before over whichever channel is currently bound.

mod source;
mod uploader;

pub use source::{DEFAULT_EXTENSIONS, DirectorySource, ItemSource, MediaItem};
pub use uploader::{UploadError, Uploader, UploaderConfig};
