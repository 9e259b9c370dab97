//! Persisted comic library: filesystem layout, name index and catalog operations

mod catalog;
mod index;
mod layout;

pub use catalog::{
    page_stem, Catalog, CatalogError, CatalogResult, ChapterDetails, ComicDetails, ComicSummary,
    PageDetails,
};
pub use index::ComicIndex;
pub use layout::{
    read_json, validate_component, write_json_atomic, Area, ComicInfo, Library, COVER_FILE,
    ROOT_CHAPTER,
};
