/*
 * pathauditor: detect user-controlled paths in filesystem syscalls
 * Copyright (C) 2024 The pathauditor authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

// We need to permit unsafe code because we are interacting with libc APIs.
#![allow(unsafe_code)]

//! Thin wrappers around the raw syscalls the auditor issues.
//!
//! The wrappers exist for two reasons: Rust's standard library does not
//! expose the dirfd-relative variants we need, and the errors they produce
//! carry enough detail (syscall name, arguments, errno) to explain exactly
//! which probe of the filesystem failed mid-audit.

use crate::flags::OpenFlags;

use std::{
    ffi::CString,
    fmt,
    mem::MaybeUninit,
    os::unix::{
        ffi::OsStrExt,
        io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd},
    },
    path::{Path, PathBuf},
};

use rustix::{
    fs::{self as rustix_fs, AtFlags, IFlags, Mode, Stat, StatFs},
    io::Errno,
    process as rustix_process,
};

/// Representation of a file descriptor at a given point in time.
///
/// This is only used to make pretty-printing syscall arguments nicer. The
/// stored value is very unlikely to still reference a live descriptor by the
/// time anyone reads the error, so no path lookup is attempted.
#[derive(Clone, Debug)]
pub(crate) struct FrozenFd(RawFd);

impl<Fd: AsFd> From<Fd> for FrozenFd {
    fn from(fd: Fd) -> Self {
        Self(fd.as_fd().as_raw_fd())
    }
}

impl fmt::Display for FrozenFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            libc::AT_FDCWD => write!(f, "[AT_FDCWD]"),
            fd => write!(f, "[{fd}]"),
        }
    }
}

/// Internal error returned by pathauditor's syscall wrappers.
///
/// Users would most often not interact with these error variants directly and
/// instead would make use of the top-level [`Error`] type.
///
/// [`Error`]: crate::error::Error
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("invalid dirfd {fd} passed by intercepted syscall")]
    InvalidFd { fd: RawFd, source: Errno },

    #[error("openat({dirfd}, {path:?}, {flags:?})")]
    Openat {
        dirfd: FrozenFd,
        path: PathBuf,
        flags: OpenFlags,
        source: Errno,
    },

    #[error("fstatat({dirfd}, {path:?}, {flags:?})")]
    Fstatat {
        dirfd: FrozenFd,
        path: PathBuf,
        flags: AtFlags,
        source: Errno,
    },

    #[error("fstat({fd})")]
    Fstat { fd: FrozenFd, source: Errno },

    #[error("fstatfs({fd})")]
    Fstatfs { fd: FrozenFd, source: Errno },

    #[error("readlinkat({dirfd}, {path:?})")]
    Readlinkat {
        dirfd: FrozenFd,
        path: PathBuf,
        source: Errno,
    },

    #[error("ioctl({fd}, FS_IOC_GETFLAGS)")]
    GetFlags { fd: FrozenFd, source: Errno },
}

impl Error {
    pub(crate) fn errno(&self) -> Errno {
        *match self {
            Error::InvalidFd { source, .. } => source,
            Error::Openat { source, .. } => source,
            Error::Fstatat { source, .. } => source,
            Error::Fstat { source, .. } => source,
            Error::Fstatfs { source, .. } => source,
            Error::Readlinkat { source, .. } => source,
            Error::GetFlags { source, .. } => source,
        }
    }
}

/// Wrapper for `openat(2)` which auto-sets `O_CLOEXEC | O_NOCTTY`.
///
/// This is needed because Rust doesn't provide a way to access the dirfd
/// argument of `openat(2)`. We need the dirfd argument, so we need a wrapper.
pub(crate) fn openat_follow<Fd: AsFd, P: AsRef<Path>>(
    dirfd: Fd,
    path: P,
    mut flags: OpenFlags,
) -> Result<OwnedFd, Error> {
    let dirfd = dirfd.as_fd();
    let path = path.as_ref();

    // O_CLOEXEC is needed for obvious reasons, and O_NOCTTY ensures that a
    // malicious file won't take control of our terminal.
    flags.insert(OpenFlags::O_CLOEXEC | OpenFlags::O_NOCTTY);

    rustix_fs::openat(dirfd, path, flags.into(), Mode::empty()).map_err(|errno| Error::Openat {
        dirfd: dirfd.into(),
        path: path.into(),
        flags,
        source: errno,
    })
}

/// Wrapper for `open(2)` (via `openat(2)` with `AT_FDCWD`).
pub(crate) fn open<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<OwnedFd, Error> {
    openat_follow(rustix_fs::CWD, path, flags)
}

/// Like [`openat_follow`], but the dirfd is a raw descriptor number taken
/// from an intercepted syscall's arguments rather than one we opened
/// ourselves.
pub(crate) fn openat_raw<P: AsRef<Path>>(
    dirfd: RawFd,
    path: P,
    flags: OpenFlags,
) -> Result<OwnedFd, Error> {
    match dirfd {
        libc::AT_FDCWD | 0.. => {}
        fd => {
            return Err(Error::InvalidFd {
                fd,
                source: Errno::BADF,
            })
        }
    }
    // SAFETY: The descriptor is positive (checked above) and only borrowed
    //         for the duration of this one openat call.
    let dirfd = unsafe { BorrowedFd::borrow_raw(dirfd) };
    openat_follow(dirfd, path, flags)
}

/// Wrapper for `fstatat(2)` with caller-controlled `AT_*` flags.
///
/// The walker needs both the no-follow and the follow variants (the latter
/// for kernel-synthesised procfs symlinks), so unlike `openat` nothing is
/// auto-set here.
pub(crate) fn fstatat<Fd: AsFd, P: AsRef<Path>>(
    dirfd: Fd,
    path: P,
    flags: AtFlags,
) -> Result<Stat, Error> {
    let dirfd = dirfd.as_fd();
    let path = path.as_ref();

    rustix_fs::statat(dirfd, path, flags).map_err(|errno| Error::Fstatat {
        dirfd: dirfd.into(),
        path: path.into(),
        flags,
        source: errno,
    })
}

/// Wrapper for `fstat(2)`.
pub(crate) fn fstat<Fd: AsFd>(fd: Fd) -> Result<Stat, Error> {
    let fd = fd.as_fd();

    rustix_fs::fstat(fd).map_err(|errno| Error::Fstat {
        fd: fd.into(),
        source: errno,
    })
}

/// Wrapper for `fstatfs(2)`.
pub(crate) fn fstatfs<Fd: AsFd>(fd: Fd) -> Result<StatFs, Error> {
    let fd = fd.as_fd();

    rustix_fs::fstatfs(fd).map_err(|errno| Error::Fstatfs {
        fd: fd.into(),
        source: errno,
    })
}

/// Wrapper for `readlinkat(2)`.
///
/// The target is read into a `PATH_MAX`-sized buffer; a target that fills the
/// buffer completely is reported as `ENAMETOOLONG` because we cannot know
/// whether it was truncated.
pub(crate) fn readlinkat<Fd: AsFd, P: AsRef<Path>>(dirfd: Fd, path: P) -> Result<PathBuf, Error> {
    let dirfd = dirfd.as_fd();
    let path = path.as_ref();

    let mut linkbuf: [MaybeUninit<u8>; libc::PATH_MAX as usize] =
        [MaybeUninit::uninit(); libc::PATH_MAX as usize];

    let (target, trailing) =
        rustix_fs::readlinkat_raw(dirfd, path, &mut linkbuf[..]).map_err(|errno| {
            Error::Readlinkat {
                dirfd: dirfd.into(),
                path: path.into(),
                source: errno,
            }
        })?;

    if trailing.is_empty() {
        // The buffer was fully consumed, so the target may be truncated.
        Err(Error::Readlinkat {
            dirfd: dirfd.into(),
            path: path.into(),
            source: Errno::NAMETOOLONG,
        })
    } else {
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(target)))
    }
}

/// Wrapper for `ioctl(FS_IOC_GETFLAGS)`.
pub(crate) fn ioctl_getflags<Fd: AsFd>(fd: Fd) -> Result<IFlags, Error> {
    let fd = fd.as_fd();

    rustix_fs::ioctl_getflags(fd).map_err(|errno| Error::GetFlags {
        fd: fd.into(),
        source: errno,
    })
}

pub(crate) fn geteuid() -> rustix_process::RawUid {
    rustix_process::geteuid().as_raw()
}

/// Wrapper for `syslog(3)`.
///
/// The message is passed through a `"%s"` format so attacker-influenced path
/// bytes can never be interpreted as conversion specifications. Interior NUL
/// bytes are replaced since they would truncate the record.
pub(crate) fn syslog(priority: libc::c_int, message: &str) {
    let sanitised: Vec<u8> = message
        .bytes()
        .map(|b| if b == 0 { b' ' } else { b })
        .collect();
    let message = CString::new(sanitised).expect("nul bytes should've been replaced");

    // SAFETY: The ident is a static NUL-terminated string (openlog keeps the
    //         pointer), and syslog receives a fixed "%s" format with exactly
    //         one matching argument.
    unsafe {
        libc::openlog(
            b"pathauditor\0".as_ptr().cast(),
            libc::LOG_PID,
            libc::LOG_USER,
        );
        libc::syslog(priority, b"%s\0".as_ptr().cast(), message.as_ptr());
    }
}
