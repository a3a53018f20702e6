//! WordPress installation discovery

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File that marks a WordPress installation root
pub const WP_CONFIG_FILE: &str = "wp-config.php";

/// Walk up from `start` and return the nearest directory holding `wp-config.php`
pub fn find_wordpress_path(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(WP_CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Resolve the working WordPress directory.
///
/// An explicit path is used verbatim. Otherwise the nearest ancestor of
/// `cwd` containing `wp-config.php` is selected.
pub fn resolve_wordpress_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    find_wordpress_path(cwd).ok_or_else(|| Error::PathNotFound {
        searched_from: cwd.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_ancestor_wins() {
        let root = tempfile::tempdir().unwrap();
        let site = root.path().join("srv/mysite");
        let nested = site.join("wp-content/themes/child");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(site.join(WP_CONFIG_FILE), "<?php").unwrap();

        assert_eq!(find_wordpress_path(&nested), Some(site.clone()));
        assert_eq!(resolve_wordpress_path(None, &nested).unwrap(), site);
    }

    #[test]
    fn test_explicit_path_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let explicit = PathBuf::from("/does/not/need/to/exist");
        let resolved = resolve_wordpress_path(Some(&explicit), root.path()).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_missing_config_is_path_not_found() {
        let root = tempfile::tempdir().unwrap();
        let err = resolve_wordpress_path(None, root.path()).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
    }

    #[test]
    fn test_directory_named_wp_config_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(WP_CONFIG_FILE)).unwrap();
        assert!(find_wordpress_path(root.path()).is_none());
    }
}
