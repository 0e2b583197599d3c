use std::path::{Path, PathBuf};

use user_handles::TableLimits;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Where the session region lives.
pub enum Backing {
    /// Private memory. Only the owner process can see the table.
    #[default]
    Anonymous,
    /// A file that client processes map read-only.
    File(PathBuf),
}

#[derive(Debug, Clone)]
/// Configuration for a [crate::UserSession].
pub struct ServerConfig {
    pub limits: TableLimits,
    pub backing: Backing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            limits: TableLimits::default(),
            backing: Backing::Anonymous,
        }
    }
}

impl ServerConfig {
    pub fn limits(mut self, limits: TableLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Publish the region through the file at `path`.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.backing = Backing::File(path.as_ref().to_path_buf());
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.backing = Backing::Anonymous;
        self
    }
}
