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

#![forbid(unsafe_code)]

use crate::{
    error::{Error, ErrorImpl},
    flags::OpenFlags,
    syscalls,
};

use std::{
    os::unix::io::{OwnedFd, RawFd},
    path::{Path, PathBuf},
};

/// How the auditor obtains directory descriptors in the filesystem view of
/// the process that issued the syscall under audit.
///
/// Every operation returns a freshly opened descriptor that is exclusively
/// owned by the caller and remains valid independently of the provider; it
/// closes when the returned [`OwnedFd`] is dropped.
pub trait ProcessInformation {
    /// Open the target process's root directory.
    fn root_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error>;

    /// Open the target process's current working directory.
    fn cwd_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error>;

    /// Re-open a directory descriptor `fd` of the target process with our
    /// own `flags`.
    fn dup_dir_fd(&self, fd: RawFd, flags: OpenFlags) -> Result<OwnedFd, Error>;
}

/// The process making the audit calls itself. Descriptors are opened
/// directly (`/`, `.`, and `openat(fd, ".")`).
///
/// This is the provider an interception layer uses, since it runs on the
/// thread that issued the intercepted call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SameProcessInformation;

impl ProcessInformation for SameProcessInformation {
    fn root_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error> {
        syscalls::open("/", flags).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: "open process root directory".into(),
                source: err,
            }
            .into()
        })
    }

    fn cwd_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error> {
        syscalls::open(".", flags).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: "open current working directory".into(),
                source: err,
            }
            .into()
        })
    }

    fn dup_dir_fd(&self, fd: RawFd, flags: OpenFlags) -> Result<OwnedFd, Error> {
        // Re-open "." relative to the descriptor instead of dup-ing it so
        // that the open flags are ours rather than whatever the intercepted
        // process opened the directory with.
        syscalls::openat_raw(fd, ".", flags).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: "re-open directory descriptor".into(),
                source: err,
            }
            .into()
        })
    }
}

/// A remote process, viewed through `/proc/<pid>/`.
///
/// The pid and cwd are used to look up directory descriptors; the cmdline is
/// optional and only used for reporting. With `fallback` enabled, lookups
/// that fail (typically because the process has exited and its `/proc` entry
/// is gone) are retried against the ambient mount namespace.
#[derive(Clone, Debug)]
pub struct RemoteProcessInformation {
    pid: libc::pid_t,
    cwd: PathBuf,
    cmdline: Option<String>,
    fallback: bool,
}

impl RemoteProcessInformation {
    pub fn new(pid: libc::pid_t, cwd: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            cwd: cwd.into(),
            cmdline: None,
            fallback: false,
        }
    }

    pub fn with_cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = Some(cmdline.into());
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn cmdline(&self) -> Option<&str> {
        self.cmdline.as_deref()
    }

    fn proc_path(&self, sub: &Path) -> PathBuf {
        let mut path = PathBuf::from("/proc");
        path.push(self.pid.to_string());
        // PathBuf::push would replace the whole path if sub were absolute.
        path.push(sub.strip_prefix("/").unwrap_or(sub));
        path
    }

    fn open_in_proc(&self, sub: impl AsRef<Path>, flags: OpenFlags) -> Result<OwnedFd, Error> {
        let path = self.proc_path(sub.as_ref());
        syscalls::open(&path, flags).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: format!("open {} of remote process", path.display()).into(),
                source: err,
            }
            .into()
        })
    }
}

impl ProcessInformation for RemoteProcessInformation {
    fn root_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error> {
        match self.open_in_proc("root", flags) {
            Err(_) if self.fallback => {
                // The process is gone; fall back to the root of our own
                // mount namespace.
                syscalls::open("/", flags).map_err(|err| {
                    ErrorImpl::RawOsError {
                        operation: "open fallback root directory".into(),
                        source: err,
                    }
                    .into()
                })
            }
            result => result,
        }
    }

    fn cwd_fd(&self, flags: OpenFlags) -> Result<OwnedFd, Error> {
        // The root of the target process might not be the same as ours, so
        // resolve its cwd under /proc/<pid>/root.
        let sub = Path::new("root").join(self.cwd.strip_prefix("/").unwrap_or(&self.cwd));
        match self.open_in_proc(sub, flags) {
            Err(_) if self.fallback => syscalls::open(&self.cwd, flags).map_err(|err| {
                ErrorImpl::RawOsError {
                    operation: "open fallback working directory".into(),
                    source: err,
                }
                .into()
            }),
            result => result,
        }
    }

    fn dup_dir_fd(&self, fd: RawFd, flags: OpenFlags) -> Result<OwnedFd, Error> {
        self.open_in_proc(format!("fd/{fd}"), flags)
    }
}
