use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::paths::TEMPLATE_EXT;

/// Lazily walks `root` and yields every template file below it.
///
/// Directories are descended as soon as they are encountered, so a
/// sub-directory's templates come before those of its later siblings.
/// Entries keep directory-listing order. A missing root yields nothing, and
/// entries that cannot be read are skipped.
pub fn scan(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                if e.depth() == 0 && is_not_found(&e) {
                    debug!("Template root does not exist: {:?}", e.path());
                } else {
                    warn!("Skipping unreadable entry: {}", e);
                }
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_template(path))
}

pub fn is_template(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMPLATE_EXT) && name.len() > TEMPLATE_EXT.len())
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}
