//! Repository access for mapsync
//!
//! This crate retrieves everything mapsync reads from a repository:
//!
//! - **Transports**: HTTP(S) through reqwest with retries and timeouts, and a
//!   filesystem transport for `file://` mirrors, behind one [`Transport`] trait
//! - **Repository resolution**: `<base>/<branch>` with the `auto` branch
//!   derived from the local tool version
//! - **Catalog client**: reference tool description and catalog retrieval
//! - **Catalog parsing**: per-line error reporting, sentinel filtering,
//!   duplicate and unsafe name rejection, deterministic ordering
//!
//! # Examples
//!
//! ```rust,no_run
//! use mapsync_network::{transport_for, CatalogClient, CatalogParser, CatalogResources};
//! use mapsync_network::{Repository, TransportConfig};
//!
//! # async fn example() -> mapsync_types::Result<()> {
//! let transport = transport_for("http://ufoai.ninex.info/maps", &TransportConfig::default())?;
//! let client = CatalogClient::new(
//!     transport,
//!     CatalogParser::new("ufo2map").with_artifact_extension("bsp"),
//!     CatalogResources::default(),
//! );
//!
//! let repository = Repository::new("http://ufoai.ninex.info/maps", "2.3");
//! let catalog = client.fetch_catalog(&repository).await?;
//! println!("{} entries", catalog.len());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod client;
pub mod file;
pub mod http;
pub mod repository;
pub mod transport;

pub use catalog::{Catalog, CatalogParser, LineIssue};
pub use client::{CatalogClient, CatalogResources};
pub use file::FileTransport;
pub use http::{HttpTransport, TransportConfig};
pub use repository::Repository;
pub use transport::{ByteStream, Payload, Transport};

use mapsync_types::{Error, Result};
use std::sync::Arc;

/// Pick the transport matching a repository base location.
///
/// `http`/`https` URLs use [`HttpTransport`]; `file://` URLs and plain
/// paths use [`FileTransport`].
pub fn transport_for(base: &str, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    match base.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase()) {
        Some(scheme) if scheme == "http" || scheme == "https" => {
            Ok(Arc::new(HttpTransport::new(config)?))
        }
        Some(scheme) if scheme == "file" => Ok(Arc::new(FileTransport::new(config.chunk_size))),
        Some(scheme) => Err(Error::config(format!(
            "Unsupported repository scheme '{}'",
            scheme
        ))),
        None => Ok(Arc::new(FileTransport::new(config.chunk_size))),
    }
}
