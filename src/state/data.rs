/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the catalog layer, the view-state controller and the UI layer.
use std::collections::BTreeMap;

/// Metrics key holding the quality score used by "By Quality" sorting
pub const QUALITY_SCORE_KEY: &str = "quality";

/// A named grouping of items (an "album")
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// Opaque catalog ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Number of items currently attached
    pub item_count: i64,
}

/// A single media asset in the library
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Opaque catalog ID
    pub id: String,
    /// Original filename (e.g., "IMG_0042.jpg")
    pub filename: String,
    /// Capture time in the camera's local time, RFC 3339 or naive ISO 8601.
    /// None (or an unparsable value) sorts as the epoch.
    pub local_datetime: Option<String>,
    /// When the source file was created on the uploading device
    pub file_created_at: String,
    /// Named numeric metrics (e.g. "quality" in 0.0..=1.0)
    pub metrics: Option<BTreeMap<String, f64>>,
    /// Size of the stored asset data in bytes
    pub byte_size: i64,
}

impl Item {
    /// Quality score, if the metrics mapping carries one.
    /// NaN is treated as absent.
    pub fn quality_score(&self) -> Option<f64> {
        self.metrics
            .as_ref()
            .and_then(|m| m.get(QUALITY_SCORE_KEY))
            .copied()
            .filter(|score| !score.is_nan())
    }
}

/// Scope of an item listing.
///
/// Precedence: search, then collection, then person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub collection_id: Option<String>,
    /// When set, overrides `collection_id`
    pub search_query: Option<String>,
    /// Items where this person's face was recognised
    pub person_id: Option<String>,
}

impl ItemFilter {
    pub fn person(person_id: impl Into<String>) -> Self {
        ItemFilter {
            person_id: Some(person_id.into()),
            ..ItemFilter::default()
        }
    }
}

/// Someone recognised across the library's faces
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: String,
    /// None until someone names them
    pub name: Option<String>,
    /// Number of distinct items the person appears in
    pub item_count: i64,
}

impl Person {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed Person")
    }
}

/// Changes applied by `update_person`. An empty name clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonUpdate {
    pub name: String,
}

/// Changes applied by `update_collection`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionUpdate {
    pub name: String,
}

/// Device-side metadata sent along with uploaded bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMeta {
    /// Unique per device, e.g. "desktop-upload-1718000000000-0"
    pub device_asset_id: String,
    pub device_id: String,
    pub filename: String,
    /// RFC 3339
    pub file_created_at: String,
    /// RFC 3339
    pub file_modified_at: String,
    pub metrics: Option<BTreeMap<String, f64>>,
}
