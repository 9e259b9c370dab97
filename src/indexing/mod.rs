//! Archive processing pipeline

mod analysis;
pub mod archive;
pub mod chapters;
pub mod errors;
pub mod intake;
mod processor;

pub use analysis::{page_stream_id, summary_stream_id, PageOutcome};
pub use archive::{content_hash, default_comic_name};
pub use chapters::{discover_chapters, ChapterSource, ImageFilter};
pub use errors::{PipelineError, PipelineResult, ProcessingStage};
pub use intake::{AlreadyStaged, StagedArchive};
pub use processor::{ArchiveProcessor, Backends};
