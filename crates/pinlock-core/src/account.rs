//! Local account resolution
//!
//! A `UserAccount` is resolved once by the caller and threaded through every
//! component. All storage paths are derived from it on demand; nothing is kept
//! in shared buffers.

use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::error::{PinlockError, Result};
use crate::{CREDENTIAL_SUFFIX, LEDGER_SUFFIX, PINLOCK_DIR, USER_CONFIG_FILE};

/// Upper bound for the getpw*_r scratch buffer
const MAX_PASSWD_BUF: usize = 1 << 20;

/// A local account and where its pinlock records live
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAccount {
    name: String,
    uid: u32,
    gid: u32,
    home: PathBuf,
}

impl UserAccount {
    /// Build an account with an explicit home directory
    ///
    /// The account is attributed to the current process's effective uid/gid.
    pub fn new(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        // SAFETY: geteuid/getegid have no preconditions and cannot fail
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self {
            name: name.into(),
            uid,
            gid,
            home: home.into(),
        }
    }

    /// Look up an account in the passwd database
    pub fn lookup(name: &str) -> Result<Self> {
        validate_name(name)?;
        let c_name =
            CString::new(name).map_err(|_| PinlockError::InvalidUser(name.to_string()))?;

        passwd_entry(|pwd, buf, len, result| {
            // SAFETY: all pointers are valid for the duration of the call
            unsafe { libc::getpwnam_r(c_name.as_ptr(), pwd, buf, len, result) }
        })?
        .ok_or_else(|| PinlockError::UserNotFound(name.to_string()))
    }

    /// The account of the invoking (real) uid
    pub fn current() -> Result<Self> {
        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };

        passwd_entry(|pwd, buf, len, result| {
            // SAFETY: all pointers are valid for the duration of the call
            unsafe { libc::getpwuid_r(uid, pwd, buf, len, result) }
        })?
        .ok_or_else(|| PinlockError::UserNotFound(format!("uid {}", uid)))
    }

    /// Resolve a named account, or the invoking account when no name is given
    pub fn resolve(name: Option<&str>) -> Result<Self> {
        match name {
            Some(name) if !name.is_empty() => Self::lookup(name),
            _ => Self::current(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn home(&self) -> &std::path::Path {
        &self.home
    }

    /// `~/.pinlock`
    pub fn pinlock_dir(&self) -> PathBuf {
        self.home.join(PINLOCK_DIR)
    }

    /// `~/.pinlock/<user>.pin`
    pub fn credential_path(&self) -> PathBuf {
        self.pinlock_dir()
            .join(format!("{}.{}", self.name, CREDENTIAL_SUFFIX))
    }

    /// `~/.pinlock/<user>.ratelimit`
    pub fn ledger_path(&self) -> PathBuf {
        self.pinlock_dir()
            .join(format!("{}.{}", self.name, LEDGER_SUFFIX))
    }

    /// `~/.pinlock/pinlock.conf`
    pub fn config_path(&self) -> PathBuf {
        self.pinlock_dir().join(USER_CONFIG_FILE)
    }
}

/// Reject names that cannot safely key a file name
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\0']) {
        return Err(PinlockError::InvalidUser(name.to_string()));
    }
    Ok(())
}

/// Run a getpw*_r call, growing the scratch buffer on ERANGE
fn passwd_entry<F>(mut call: F) -> Result<Option<UserAccount>>
where
    F: FnMut(
        *mut libc::passwd,
        *mut libc::c_char,
        libc::size_t,
        *mut *mut libc::passwd,
    ) -> libc::c_int,
{
    let mut buf_len = 1024;

    loop {
        // SAFETY: passwd is a plain C struct; all-zero is a valid bit pattern
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut buf: Vec<libc::c_char> = vec![0; buf_len];
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = call(&mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);

        match rc {
            0 => {}
            libc::ERANGE if buf_len < MAX_PASSWD_BUF => {
                buf_len *= 2;
                continue;
            }
            libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM => return Ok(None),
            errno => return Err(io::Error::from_raw_os_error(errno).into()),
        }

        if result.is_null() {
            return Ok(None);
        }

        // SAFETY: on success pw_name and pw_dir point into `buf`, which is alive
        let (name, home) = unsafe {
            (
                CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned(),
                PathBuf::from(OsStr::from_bytes(CStr::from_ptr(pwd.pw_dir).to_bytes())),
            )
        };

        return Ok(Some(UserAccount {
            name,
            uid: pwd.pw_uid,
            gid: pwd.pw_gid,
            home,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_keyed_by_username() {
        let user = UserAccount::new("alice", "/home/alice");
        assert_eq!(user.pinlock_dir(), PathBuf::from("/home/alice/.pinlock"));
        assert_eq!(
            user.credential_path(),
            PathBuf::from("/home/alice/.pinlock/alice.pin")
        );
        assert_eq!(
            user.ledger_path(),
            PathBuf::from("/home/alice/.pinlock/alice.ratelimit")
        );
        assert_eq!(
            user.config_path(),
            PathBuf::from("/home/alice/.pinlock/pinlock.conf")
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        for name in ["", "..", ".hidden", "a/b", "nul\0"] {
            assert!(matches!(
                UserAccount::lookup(name),
                Err(PinlockError::InvalidUser(_))
            ));
        }
    }

    #[test]
    fn test_unknown_user() {
        let result = UserAccount::lookup("pinlock-no-such-user-7f3a");
        assert!(matches!(result, Err(PinlockError::UserNotFound(_))));
    }

    #[test]
    fn test_root_lookup() {
        let root = UserAccount::lookup("root").unwrap();
        assert_eq!(root.uid(), 0);
        assert!(!root.home().as_os_str().is_empty());
    }

    #[test]
    fn test_resolve_empty_name_falls_back_to_current() {
        // Containers may run without a passwd entry for the current uid
        if let Ok(current) = UserAccount::current() {
            assert_eq!(UserAccount::resolve(Some("")).unwrap(), current);
            assert_eq!(UserAccount::resolve(None).unwrap(), current);
        }
    }
}
