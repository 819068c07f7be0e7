//! XMP sidecar merging for GeoRAW
//!
//! Photos are never modified; GPS positions and series keywords go into an
//! `.xmp` sidecar next to each file. Merges own exactly two regions of the
//! document and leave everything else byte-for-byte intact.

pub mod document;
pub mod gps;
pub mod keywords;
pub mod store;

pub use document::{Region, SidecarDocument, SidecarError};
pub use gps::{format_gps_coordinate, gps_attributes, parse_gps_coordinate, GpsReading, EXIF_NAMESPACE, GPS_VERSION_ID};
pub use keywords::{normalize_tags, DC_NAMESPACE};
pub use store::{sidecar_path, SidecarStore, WriteOutcome};
