//! Git repository detection and working-tree changes

use std::path::{Path, PathBuf};

use git2::{Delta, DiffOptions, Repository};

use crate::{Error, Result};

/// A git repository wrapper exposing what tddgate needs from version control
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the repository root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Git(format!(
                    "Not a git repository: {}. Run 'git init' first or navigate to a git repository.",
                    path.display()
                ))
            } else {
                Error::from(e)
            }
        })?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::Git("Bare repositories are not supported".to_string()))?;
        let root = std::fs::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files that differ between the last commit and the working tree.
    ///
    /// Covers staged and unstaged changes that were added, copied, modified
    /// or renamed; deletions are not reported. Untracked files are only
    /// included when `include_untracked` is set. Before the first commit
    /// every staged file counts as added. Paths are absolute.
    pub fn changed_files(&self, include_untracked: bool) -> Result<Vec<PathBuf>> {
        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut opts = DiffOptions::new();
        opts.include_untracked(include_untracked)
            .recurse_untracked_dirs(include_untracked);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            let wanted = match delta.status() {
                Delta::Added | Delta::Copied | Delta::Modified | Delta::Renamed => true,
                Delta::Untracked => include_untracked,
                _ => false,
            };
            if !wanted {
                continue;
            }
            if let Some(path) = delta.new_file().path() {
                files.push(self.root.join(path));
            }
        }

        tracing::debug!(root = %self.root.display(), count = files.len(), "Collected changed files");
        Ok(files)
    }
}
