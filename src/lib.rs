pub mod app;

pub use app::envfs::{DirFileSystem, EnvFileSystem, FallbackFileSystem, File, FileInfo, FileSystem, FsError};
pub use app::matcher::{parse_patterns, selects, PathFilter, Pattern};
pub use app::models::MissingVars;
pub use app::placeholder::{substitute, Environment, ProcessEnv};
pub use app::scanner::{scan, ScanError, Scanner};
