//! Lazy recursive archive discovery.
//!
//! [`ArchiveWalk`] yields every regular file below a root whose name ends in
//! `.tgz`, depth first, visiting the entries of each directory in lexical
//! order. Directories are read only when the walk reaches them, so a caller
//! that stops early never touches the rest of the tree. Symbolic links are
//! not followed, and entries whose names are not UTF-8 are skipped.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use log::{trace, warn};

use crate::ARCHIVE_SUFFIX;

/// Iterator over candidate chart archives below a root directory.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use chart_mirror_core::walk::ArchiveWalk;
///
/// for archive in ArchiveWalk::new(Utf8Path::new("/srv/charts")) {
///     let archive = archive.expect("readable directory");
///     println!("{archive}");
/// }
/// ```
#[derive(Debug)]
pub struct ArchiveWalk {
    /// Pending entries per open directory, each in reverse lexical order so
    /// the next entry is popped from the end.
    stack: Vec<Vec<Utf8PathBuf>>,
}

impl ArchiveWalk {
    /// Start a walk rooted at `root`.
    #[must_use]
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            stack: vec![vec![root.to_owned()]],
        }
    }

    fn next_path(&mut self) -> Option<Utf8PathBuf> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.pop() {
                Some(path) => return Some(path),
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    /// Queue the entries of `dir`. Entries whose names are not UTF-8 are
    /// skipped with a warning.
    fn descend(&mut self, dir: &Utf8Path) -> io::Result<()> {
        let mut children = Vec::new();
        for entry in dir.as_std_path().read_dir()? {
            match Utf8PathBuf::try_from(entry?.path()) {
                Ok(path) => children.push(path),
                Err(err) => warn!("skipping non-UTF-8 path {}", err.as_path().display()),
            }
        }
        children.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        self.stack.push(children);
        Ok(())
    }
}

impl Iterator for ArchiveWalk {
    type Item = io::Result<Utf8PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(path) = self.next_path() {
            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => return Some(Err(err)),
            };
            if metadata.is_dir() {
                if let Err(err) = self.descend(&path) {
                    return Some(Err(err));
                }
                continue;
            }
            if metadata.is_file() && is_archive_name(&path) {
                trace!("found archive {path}");
                return Some(Ok(path));
            }
        }
        None
    }
}

fn is_archive_name(path: &Utf8Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.ends_with(ARCHIVE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Tree {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn tree() -> Tree {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        for file in [
            "b.tgz",
            "a.tgz",
            "notes.txt",
            "c.tgz.bak",
            "nested/z.tgz",
            "nested/deeper/y.tgz",
            "a-dir/x.tgz",
        ] {
            let path = root.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create dirs");
            }
            std::fs::write(&path, b"").expect("write file");
        }
        std::fs::create_dir_all(root.join("dir.tgz")).expect("create dir named like an archive");
        Tree { _dir: dir, root }
    }

    fn relative(tree: &Tree, paths: Vec<Utf8PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(&tree.root).expect("below root").to_string())
            .collect()
    }

    #[rstest]
    fn yields_archives_depth_first_in_lexical_order(tree: Tree) {
        let found = ArchiveWalk::new(&tree.root)
            .collect::<io::Result<Vec<_>>>()
            .expect("walk");

        assert_eq!(
            relative(&tree, found),
            vec!["a-dir/x.tgz", "a.tgz", "b.tgz", "nested/deeper/y.tgz", "nested/z.tgz"]
        );
    }

    #[rstest]
    fn walk_is_lazy(tree: Tree) {
        let mut walk = ArchiveWalk::new(&tree.root);
        let first = walk.next().expect("one archive").expect("readable");
        assert!(first.ends_with("a-dir/x.tgz"));

        // `nested` has not been listed yet, so a late addition is still seen.
        std::fs::write(tree.root.join("nested/late.tgz"), b"").expect("write file");
        let rest = walk.collect::<io::Result<Vec<_>>>().expect("walk");
        assert_eq!(
            relative(&tree, rest),
            vec!["a.tgz", "b.tgz", "nested/deeper/y.tgz", "nested/late.tgz", "nested/z.tgz"]
        );
    }

    #[cfg(target_os = "linux")]
    #[rstest]
    fn non_utf8_names_are_skipped(tree: Tree) {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let nested = tree.root.join("nested").into_std_path_buf();
        std::fs::write(nested.join(OsStr::from_bytes(b"bad-\xff.tgz")), b"").expect("write file");
        std::fs::create_dir(nested.join(OsStr::from_bytes(b"dir-\xfe"))).expect("create dir");

        let found = ArchiveWalk::new(&tree.root)
            .collect::<io::Result<Vec<_>>>()
            .expect("walk");

        assert_eq!(
            relative(&tree, found),
            vec!["a-dir/x.tgz", "a.tgz", "b.tgz", "nested/deeper/y.tgz", "nested/z.tgz"]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let mut walk = ArchiveWalk::new(Utf8Path::new("/nonexistent/charts"));
        assert!(matches!(walk.next(), Some(Err(_))));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        assert_eq!(ArchiveWalk::new(&root).count(), 0);
    }
}
