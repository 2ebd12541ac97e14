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

//! The path-resolution auditor.
//!
//! [`path_is_user_controlled`] walks a path component-by-component the way
//! the kernel would resolve it inside the target process's filesystem
//! namespace, and asks of every component: could an unprivileged user swap
//! this out for a symlink between the privileged process checking the path
//! and using it? The walk keeps exactly one directory descriptor open (the
//! directory it is currently "in"), chases symlinks by splicing their targets
//! into the front of the remaining components, and restarts from the
//! process's root on absolute symlink targets.
//!
//! The walk races against the filesystem it inspects by nature; the verdict
//! is "an unprivileged user *could have* controlled this path", not a proof
//! about the resolution the kernel actually performed.

use crate::{
    error::{Error, ErrorExt, ErrorImpl},
    flags::OpenFlags,
    process::ProcessInformation,
    syscalls,
    utils::{FdExt, PathIterExt},
};

use std::{
    collections::VecDeque,
    ffi::{OsStr, OsString},
    os::unix::io::{AsFd, BorrowedFd, OwnedFd, RawFd},
    path::Path,
};

use rustix::{
    fs::{AtFlags, FileType},
    io::Errno,
};

/// Default cap on the number of components one walk may process.
///
/// The cap bounds both depth and the lateral growth caused by splicing
/// symlink targets into the queue, so it is the symlink-loop guard.
pub const DEFAULT_MAX_WALK_ITERATIONS: u32 = 40;

// O_PATH is not enough: the immutability check is an inode-flags ioctl, and
// that fails on O_PATH descriptors.
const DIR_OPEN_FLAGS: OpenFlags = OpenFlags::O_RDONLY;

/// Open the directory a walk of `path` starts from, in the filesystem view
/// of `proc_info`.
pub(crate) fn resolve_start_dir<I>(
    proc_info: &I,
    path: &Path,
    at_fd: Option<RawFd>,
) -> Result<OwnedFd, Error>
where
    I: ProcessInformation + ?Sized,
{
    if path.is_absolute() {
        proc_info.root_fd(DIR_OPEN_FLAGS)
    } else {
        match at_fd {
            Some(fd) if fd != libc::AT_FDCWD => proc_info.dup_dir_fd(fd, DIR_OPEN_FLAGS),
            _ => proc_info.cwd_fd(DIR_OPEN_FLAGS),
        }
    }
}

/// The walk's single open directory descriptor.
///
/// At any point the cursor owns exactly one descriptor; descending into a
/// subdirectory or resetting to the root replaces it, and the displaced
/// descriptor closes immediately. Dropping the cursor (on every return path)
/// closes the held descriptor, so no walk can leak.
struct WalkCursor {
    dir: OwnedFd,
}

impl WalkCursor {
    fn start<I>(proc_info: &I, path: &Path, at_fd: Option<RawFd>) -> Result<Self, Error>
    where
        I: ProcessInformation + ?Sized,
    {
        Ok(Self {
            dir: resolve_start_dir(proc_info, path, at_fd)?,
        })
    }

    fn as_fd(&self) -> BorrowedFd<'_> {
        self.dir.as_fd()
    }

    /// Enter a subdirectory of the current directory.
    fn descend(&mut self, elem: &OsStr) -> Result<(), Error> {
        // Symlinks are followed here: the caller has already classified the
        // entry, and on procfs the entry may legitimately be a kernel
        // magic-link to the directory we want.
        self.dir = syscalls::openat_follow(&self.dir, elem, DIR_OPEN_FLAGS).map_err(|err| {
            ErrorImpl::RawOsError {
                operation: "open next path component".into(),
                source: err,
            }
        })?;
        Ok(())
    }

    /// Restart from the target process's root (an absolute symlink target).
    fn reset_to_root<I>(&mut self, proc_info: &I) -> Result<(), Error>
    where
        I: ProcessInformation + ?Sized,
    {
        self.dir = proc_info.root_fd(DIR_OPEN_FLAGS)?;
        Ok(())
    }
}

/// Decide whether `elem` inside the directory `dir` could be replaced by an
/// unprivileged user.
///
/// The directory's ownership and permissions decide the answer; the entry
/// itself only matters for the immutable-flag short-circuit and for the
/// sticky-bit rules (where a missing or non-root-owned entry is the raceable
/// case).
fn component_is_user_controlled(dir: BorrowedFd<'_>, elem: &OsStr) -> Result<bool, Error> {
    // Filter out special files.
    if elem == OsStr::new(".") || elem == OsStr::new("..") {
        return Ok(false);
    }

    // If either the dir or the entry are immutable the access is safe.
    if dir.is_immutable()? {
        return Ok(false);
    }
    match syscalls::openat_follow(dir, elem, OpenFlags::O_RDONLY) {
        Ok(entry) => {
            if entry.is_immutable()? {
                return Ok(false);
            }
        }
        Err(err) if err.errno() == Errno::NOENT => {}
        Err(err) => Err(ErrorImpl::RawOsError {
            operation: "open entry for immutable check".into(),
            source: err,
        })?,
    }

    // Entries on proc and cgroup filesystems are kernel-synthesised.
    if dir.on_synthetic_filesystem()? {
        return Ok(false);
    }

    let dir_stat = syscalls::fstat(dir).map_err(|err| ErrorImpl::RawOsError {
        operation: "stat current directory".into(),
        source: err,
    })?;

    // Non-root owner.
    if dir_stat.st_uid != 0 {
        return Ok(true);
    }

    // Root-owned dir that is writable by a user.
    let group_writable = dir_stat.st_gid != 0 && (dir_stat.st_mode & libc::S_IWGRP) != 0;
    let world_writable = (dir_stat.st_mode & libc::S_IWOTH) != 0;
    if group_writable || world_writable {
        // Without the sticky bit anyone with write access can replace any
        // entry.
        if (dir_stat.st_mode & libc::S_ISVTX) == 0 {
            return Ok(true);
        }

        // In sticky dirs an entry can only be replaced by the directory
        // owner or the entry owner. The directory is root-owned (checked
        // above), which leaves entries that are non-root-owned or do not
        // exist yet.
        match syscalls::fstatat(dir, elem, AtFlags::SYMLINK_NOFOLLOW) {
            Ok(entry_stat) => {
                if entry_stat.st_uid != 0 {
                    return Ok(true);
                }
            }
            // The entry doesn't exist, but a user could create it.
            Err(err) if err.errno() == Errno::NOENT => return Ok(true),
            Err(err) => Err(ErrorImpl::RawOsError {
                operation: "stat entry of sticky directory".into(),
                source: err,
            })?,
        }
    }

    Ok(false)
}

/// Check whether any component of `path` could have been replaced by an
/// unprivileged user at the time of the call, using
/// [`DEFAULT_MAX_WALK_ITERATIONS`] as the symlink-loop guard.
///
/// If `path` is relative it is resolved from `at_fd` (or from the target
/// process's working directory when `at_fd` is `None` or `AT_FDCWD`).
///
/// # Errors
///
/// Fails with [`ErrorKind::ResourceExhausted`] when the iteration cap is
/// exceeded and with [`ErrorKind::FailedPrecondition`] when the filesystem
/// answers in a way that prevents classification.
///
/// [`ErrorKind::ResourceExhausted`]: crate::ErrorKind::ResourceExhausted
/// [`ErrorKind::FailedPrecondition`]: crate::ErrorKind::FailedPrecondition
pub fn path_is_user_controlled<I, P>(
    proc_info: &I,
    path: P,
    at_fd: Option<RawFd>,
) -> Result<bool, Error>
where
    I: ProcessInformation + ?Sized,
    P: AsRef<Path>,
{
    path_is_user_controlled_with_limit(proc_info, path, at_fd, DEFAULT_MAX_WALK_ITERATIONS)
}

/// [`path_is_user_controlled`] with a caller-chosen iteration cap.
//
// The algorithm is roughly:
// * keep a fd open to the current directory we're in
//   * absolute path => root fd
//   * AT_FDCWD => cwd fd
// * iterate over the path components
//   * dir => check perms and enter
//   * relative link => prepend target to remaining components
//   * absolute link => prepend and restart from the root
pub fn path_is_user_controlled_with_limit<I, P>(
    proc_info: &I,
    path: P,
    at_fd: Option<RawFd>,
    max_iterations: u32,
) -> Result<bool, Error>
where
    I: ProcessInformation + ?Sized,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut cursor = WalkCursor::start(proc_info, path, at_fd)?;

    let mut queue: VecDeque<OsString> = VecDeque::new();
    path.raw_components().prepend(&mut queue);

    for _ in 0..max_iterations {
        let elem = match queue.pop_front() {
            Some(elem) => elem,
            None => return Ok(false),
        };

        if elem == "." {
            continue;
        }

        if component_is_user_controlled(cursor.as_fd(), &elem)
            .with_wrap(|| format!("classify path component {elem:?}"))?
        {
            return Ok(true);
        }

        // Check whether the component actually exists. This must come after
        // the classification, since a non-existent entry could still be
        // created by a user if the directory is writable.
        let stat = match syscalls::fstatat(cursor.as_fd(), &elem, AtFlags::SYMLINK_NOFOLLOW) {
            Ok(stat) => stat,
            Err(err) if err.errno() == Errno::NOENT => return Ok(false),
            Err(err) => {
                return Err(ErrorImpl::RawOsError {
                    operation: "stat next path component".into(),
                    source: err,
                }
                .into())
            }
        };
        let mut file_type = FileType::from_raw_mode(stat.st_mode);

        // Symlinks in /proc are magic: the kernel synthesises them and a user
        // cannot swap them, so classify whatever they point to instead.
        if file_type == FileType::Symlink && cursor.as_fd().is_procfs()? {
            let stat = syscalls::fstatat(cursor.as_fd(), &elem, AtFlags::empty()).map_err(
                |err| ErrorImpl::RawOsError {
                    operation: "stat proc magic-link target".into(),
                    source: err,
                },
            )?;
            file_type = FileType::from_raw_mode(stat.st_mode);
        }

        match file_type {
            FileType::Directory => {
                cursor.descend(&elem)?;
            }
            FileType::Symlink => {
                let target = syscalls::readlinkat(cursor.as_fd(), &elem)
                    .map_err(|err| ErrorImpl::RawOsError {
                        operation: "read next symlink component".into(),
                        source: err,
                    })
                    .with_wrap(|| format!("expand symlink component {elem:?}"))?;

                // An absolute target restarts resolution from the root.
                if target.is_absolute() {
                    cursor.reset_to_root(proc_info)?;
                }
                target.raw_components().prepend(&mut queue);
            }
            _ => {
                if !queue.is_empty() {
                    return Err(ErrorImpl::FailedPrecondition {
                        description: "non-directory in the middle of the path".into(),
                    }
                    .into());
                }
                // The leaf is a regular file, device, socket, etc., and was
                // already classified above.
                return Ok(false);
            }
        }
    }

    Err(ErrorImpl::ResourceExhausted {
        description: format!("walk exceeded the iteration cap of {max_iterations}").into(),
    }
    .into())
}
