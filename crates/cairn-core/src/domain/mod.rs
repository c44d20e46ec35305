//! Domain model (identifiers, backend URIs, errors, result documents).

pub mod errors;
pub mod ids;
pub mod result;
pub mod uri;

pub use self::errors::{ErrorKind, ResultError, StoreError};
pub use self::ids::{ArtifactId, ArtifactPrefix, RESERVED_PREFIX};
pub use self::result::{
    ModelMetadata, ResultDocument, ResultKey, ResultRecord, ResultVersion, RESULT_EXTENSION,
};
pub use self::uri::{resolve, DriverConfig, FsConfig, MemoryConfig, Scheme};
