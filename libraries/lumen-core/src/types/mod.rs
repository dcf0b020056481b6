mod changeset;
mod import;
mod item;
mod media_type;
mod source;

pub use changeset::{ChangesetItem, ChangesetKind};
pub use import::{Import, ImportKey, ImportSettings, ImportTrigger};
pub use item::{MediaItem, PlaybackInfo};
pub use media_type::{media_types, MediaType};
pub use source::Source;
