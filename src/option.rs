use std::path::{Path, PathBuf};

use crate::{collection::DEFAULT_CHUNK_WIDTH, fs};

/// Configuration of a [`BatchCopySink`](crate::BatchCopySink).
#[derive(Debug, Clone)]
pub struct CopyOption {
    pub(crate) path: Option<PathBuf>,
    pub(crate) chunk_width: usize,
    pub(crate) target_batch_size: Option<usize>,
    pub(crate) use_tmp_file: bool,
}

impl Default for CopyOption {
    fn default() -> Self {
        CopyOption {
            path: None,
            chunk_width: DEFAULT_CHUNK_WIDTH,
            target_batch_size: None,
            use_tmp_file: false,
        }
    }
}

impl<P> From<P> for CopyOption
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        CopyOption {
            path: Some(path.into()),
            ..CopyOption::default()
        }
    }
}

impl CopyOption {
    /// Final output path.
    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        CopyOption {
            path: Some(path.into()),
            ..self
        }
    }

    /// Rows per chunk; also the tolerance for "close enough" batch sizes.
    pub fn chunk_width(self, chunk_width: usize) -> Self {
        CopyOption {
            chunk_width,
            ..self
        }
    }

    /// Override the copy function's desired batch size. `0` disables
    /// repartitioning.
    pub fn target_batch_size(self, target_batch_size: usize) -> Self {
        CopyOption {
            target_batch_size: Some(target_batch_size),
            ..self
        }
    }

    /// Write to `tmp_<name>` and rename onto the final path after finalize.
    pub fn use_tmp_file(self, use_tmp_file: bool) -> Self {
        CopyOption {
            use_tmp_file,
            ..self
        }
    }
}

impl CopyOption {
    pub(crate) fn final_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Path the copy function should open: the temporary sibling when
    /// `use_tmp_file` is set, the final path otherwise.
    pub fn write_path(&self) -> Option<PathBuf> {
        let path = self.path.as_deref()?;
        if self.use_tmp_file {
            Some(fs::tmp_path_for(path))
        } else {
            Some(path.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let option = CopyOption::from("/data/out.parquet")
            .chunk_width(16)
            .target_batch_size(100);
        assert_eq!(option.chunk_width, 16);
        assert_eq!(option.target_batch_size, Some(100));
        assert!(!option.use_tmp_file);
        assert_eq!(
            option.write_path(),
            Some(PathBuf::from("/data/out.parquet"))
        );
    }

    #[test]
    fn tmp_file_changes_write_path_only() {
        let option = CopyOption::from("/data/out.parquet").use_tmp_file(true);
        assert_eq!(
            option.write_path(),
            Some(PathBuf::from("/data/tmp_out.parquet"))
        );
        assert_eq!(option.final_path(), Some(Path::new("/data/out.parquet")));
        assert_eq!(CopyOption::default().write_path(), None);
    }
}
