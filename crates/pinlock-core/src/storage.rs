//! Owner-only file helpers shared by the credential store and the ledger
//!
//! `~/.pinlock` is writable by the user it belongs to, while records may be
//! written by root on that user's behalf. Every mutation therefore goes
//! through a descriptor for the verified directory: entries are created with
//! `O_EXCL | O_NOFOLLOW`, mode and owner are applied to the open file, and
//! renames and unlinks are relative to the directory descriptor.

use std::ffi::{CStr, CString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::os::unix::fs::{fchown, DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::account::UserAccount;
use crate::error::{PinlockError, Result};

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// Write `contents` to `path` inside the user's pinlock directory, atomically
pub(crate) fn write_private(user: &UserAccount, path: &Path, contents: &[u8]) -> Result<()> {
    let name = entry_name(user, path)?;
    ensure_private_dir(user)?.write(name, contents)
}

/// Remove `path` from the user's pinlock directory; returns whether it existed
pub(crate) fn remove_if_present(user: &UserAccount, path: &Path) -> Result<bool> {
    let name = entry_name(user, path)?;
    match open_private_dir(user)? {
        Some(dir) => dir.remove(name),
        None => Ok(false),
    }
}

/// Open `~/.pinlock`, creating it with mode 0700 if missing
pub(crate) fn ensure_private_dir(user: &UserAccount) -> Result<PrivateDir<'_>> {
    let path = user.pinlock_dir();

    match fs::DirBuilder::new().mode(DIR_MODE).create(&path) {
        Ok(()) => {
            let dir = open_dir(&path)?;
            hand_over(&dir, user)?;
            PrivateDir::verify(dir, &path, user)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            PrivateDir::verify(open_dir(&path)?, &path, user)
        }
        Err(e) => Err(e.into()),
    }
}

/// Open an existing `~/.pinlock`; `None` when there is none
pub(crate) fn open_private_dir(user: &UserAccount) -> Result<Option<PrivateDir<'_>>> {
    let path = user.pinlock_dir();

    match open_dir(&path) {
        Ok(dir) => PrivateDir::verify(dir, &path, user).map(Some),
        Err(PinlockError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Open a directory without following a symlink in its final component
fn open_dir(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY | libc::O_NOFOLLOW | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| match e.raw_os_error() {
            Some(libc::ELOOP) | Some(libc::ENOTDIR) => {
                PinlockError::InsecureStorage(format!("{} is not a directory", path.display()))
            }
            _ => PinlockError::Io(e),
        })
}

/// The file name of `path`, which must live directly in the pinlock directory
fn entry_name<'p>(user: &UserAccount, path: &'p Path) -> Result<&'p str> {
    let dir = user.pinlock_dir();
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|_| path.parent() == Some(dir.as_path()));

    name.ok_or_else(|| {
        PinlockError::InsecureStorage(format!("{} is outside {}", path.display(), dir.display()))
    })
}

fn c_name(name: &str) -> Result<CString> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(PinlockError::InvalidUser(name.to_string()));
    }
    CString::new(name).map_err(|_| PinlockError::InvalidUser(name.to_string()))
}

/// When running as root on behalf of another account, give the file to that account
fn hand_over(file: &File, user: &UserAccount) -> Result<()> {
    // SAFETY: geteuid has no preconditions
    let euid = unsafe { libc::geteuid() };
    if euid == 0 && user.uid() != 0 {
        fchown(file, Some(user.uid()), Some(user.gid()))?;
    }
    Ok(())
}

/// Descriptor for a pinlock directory owned by its user and not writable by others
pub(crate) struct PrivateDir<'a> {
    dir: File,
    user: &'a UserAccount,
}

impl<'a> PrivateDir<'a> {
    fn verify(dir: File, path: &Path, user: &'a UserAccount) -> Result<Self> {
        let meta = dir.metadata()?;

        if !meta.is_dir() {
            return Err(PinlockError::InsecureStorage(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        if meta.uid() != user.uid() {
            return Err(PinlockError::InsecureStorage(format!(
                "{} is owned by uid {}, expected {}",
                path.display(),
                meta.uid(),
                user.uid()
            )));
        }
        if meta.mode() & 0o022 != 0 {
            return Err(PinlockError::InsecureStorage(format!(
                "{} is writable by other users (mode {:o})",
                path.display(),
                meta.mode() & 0o777
            )));
        }

        Ok(Self { dir, user })
    }

    /// Replace `name` with `contents`, mode 0600
    ///
    /// The temp name carries the pid so concurrent writers never share one.
    pub(crate) fn write(&self, name: &str, contents: &[u8]) -> Result<()> {
        let target = c_name(name)?;
        let temp = c_name(&format!(".{}.tmp.{}", name, std::process::id()))?;

        let mut file = self.create_temp(&temp)?;
        let written = (|| -> Result<()> {
            file.write_all(contents)?;
            // the creation mode is subject to umask
            file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
            hand_over(&file, self.user)?;
            file.sync_all()?;
            self.rename(&temp, &target)?;
            Ok(())
        })();

        if written.is_err() {
            let _ = self.unlink(&temp);
        }
        written
    }

    /// Unlink `name`; returns whether it existed
    pub(crate) fn remove(&self, name: &str) -> Result<bool> {
        match self.unlink(&c_name(name)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn create_temp(&self, name: &CStr) -> Result<File> {
        match self.create_new(name) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Left over or planted; unlinkat removes the entry, never a link target
                self.unlink(name)?;
                Ok(self.create_new(name)?)
            }
            other => Ok(other?),
        }
    }

    fn create_new(&self, name: &CStr) -> io::Result<File> {
        let flags =
            libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL | libc::O_NOFOLLOW | libc::O_CLOEXEC;

        // SAFETY: name is NUL-terminated and the directory descriptor is open
        let fd = unsafe {
            libc::openat(
                self.dir.as_raw_fd(),
                name.as_ptr(),
                flags,
                FILE_MODE as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: fd was just returned by openat and nothing else owns it
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    fn rename(&self, from: &CStr, to: &CStr) -> io::Result<()> {
        let fd = self.dir.as_raw_fd();
        // SAFETY: both names are NUL-terminated and the directory descriptor is open
        let rc = unsafe { libc::renameat(fd, from.as_ptr(), fd, to.as_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn unlink(&self, name: &CStr) -> io::Result<()> {
        // SAFETY: name is NUL-terminated and the directory descriptor is open
        let rc = unsafe { libc::unlinkat(self.dir.as_raw_fd(), name.as_ptr(), 0) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
