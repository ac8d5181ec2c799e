use std::path::Path;

use crate::errors::ProvError;

pub fn file_exists<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref().exists()
}

/// Writes `content` to a sibling temp file, then renames it over `path`,
/// so readers never observe a half-written file.
pub fn write_atomic<P>(path: P, content: &str) -> Result<(), ProvError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| ProvError::BadArgs(format!("not a file path: {}", path.display())))?;

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, content).map_err(|err| {
        ProvError::FileError(err, format!("failed to write {}", tmp.display()))
    })?;

    std::fs::rename(&tmp, path).map_err(|err| {
        ProvError::FileError(
            err,
            format!("failed to rename {} to {}", tmp.display(), path.display()),
        )
    })
}

/// Copies `path` to `path.bak` once; an existing backup is kept
pub fn backup<P>(path: P) -> Result<(), ProvError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut bak = path.as_os_str().to_owned();
    bak.push(".bak");

    if file_exists(&bak) {
        return Ok(());
    }

    std::fs::copy(path, &bak).map(|_| ()).map_err(|err| {
        ProvError::FileError(err, format!("failed to back up {}", path.display()))
    })
}

/// Joins an absolute path in the new system onto the install location,
/// e.g. `/mnt` + `/etc/fstab` => `/mnt/etc/fstab`
pub fn prepend_base(base: &str, path: &str) -> String {
    match base {
        "/" | "" => path.to_string(),
        _ => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
    }
}
