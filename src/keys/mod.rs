//! Descriptor identity: interned keys, the registry, and rename-tolerant
//! resolution of persisted key strings.

mod distance;
mod key;
mod registry;
mod renames;
mod resolver;

pub use distance::levenshtein;
pub use key::{DescriptorKey, KeyNamespace, simple_name};
pub use registry::KeyRegistry;
pub use renames::{RenameTable, StaticRenameTable};
pub use resolver::{
    Detection, IdentityResolver, Resolution, SIMPLE_RENAME_MAX_DISTANCE, detect_explicit_rename,
    detect_package_move, detect_simple_rename,
};
