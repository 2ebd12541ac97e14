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

//! Per-syscall audit policy.
//!
//! Each filesystem syscall gets reduced to one or more walks of the
//! [`walker`]: which path argument to walk, which descriptor to start from,
//! whether to trim the final component first (for calls that act on the
//! entry itself and don't follow a trailing symlink), and whether a second
//! path or a writability check also needs auditing.
//!
//! [`walker`]: crate::walker

use crate::{
    error::{Error, ErrorImpl},
    event::FileEvent,
    flags::OpenFlags,
    process::ProcessInformation,
    syscalls,
    utils::dirname,
    walker::{self, path_is_user_controlled},
};

use std::{
    os::unix::io::RawFd,
    path::{Path, PathBuf},
};

use rustix::{
    fs::{AtFlags, FileType},
    io::Errno,
};

fn event_fd(event: &FileEvent, idx: usize) -> Result<RawFd, Error> {
    Ok(event.arg(idx)? as RawFd)
}

fn event_at_flags(event: &FileEvent, idx: usize) -> Result<AtFlags, Error> {
    Ok(AtFlags::from_bits_retain(
        event.arg(idx)? as std::ffi::c_uint
    ))
}

/// Check whether a file can be modified by an unprivileged user.
///
/// Used for the exec family: executing a binary that a user can rewrite is
/// unsafe no matter how safe the path leading to it is.
fn file_is_user_writable<I>(
    proc_info: &I,
    file: &Path,
    at_fd: Option<RawFd>,
) -> Result<bool, Error>
where
    I: ProcessInformation + ?Sized,
{
    let dir = walker::resolve_start_dir(proc_info, file, at_fd)?;

    let stat = match syscalls::fstatat(&dir, file, AtFlags::empty()) {
        Ok(stat) => stat,
        // The file doesn't exist, so it's not writable.
        Err(err) if err.errno() == Errno::NOENT => return Ok(false),
        Err(err) => {
            return Err(ErrorImpl::RawOsError {
                operation: "stat file for writability check".into(),
                source: err,
            }
            .into())
        }
    };

    if FileType::from_raw_mode(stat.st_mode) != FileType::RegularFile {
        return Ok(false);
    }
    // Not owned by root.
    if stat.st_uid != 0 {
        return Ok(true);
    }
    // Writable by a non-root group or by everyone.
    let group_writable = stat.st_gid != 0 && (stat.st_mode & libc::S_IWGRP) != 0;
    let world_writable = (stat.st_mode & libc::S_IWOTH) != 0;
    Ok(group_writable || world_writable)
}

/// Audit one intercepted syscall.
///
/// Returns `true` if an unprivileged user could have redirected the call by
/// substituting a path component (or, for the exec family, by rewriting the
/// executed file). Syscalls without a policy fail with
/// [`ErrorKind::NotImplemented`].
///
/// [`ErrorKind::NotImplemented`]: crate::ErrorKind::NotImplemented
pub fn file_event_is_user_controlled<I>(proc_info: &I, event: &FileEvent) -> Result<bool, Error>
where
    I: ProcessInformation + ?Sized,
{
    let mut path: PathBuf = event.path_arg(0)?.into();

    let mut fd_arg: Option<RawFd> = None;
    let mut skip_last_element = false;

    match event.syscall_nr() {
        libc::SYS_chmod
        | libc::SYS_chown
        | libc::SYS_chdir
        | libc::SYS_rmdir
        | libc::SYS_uselib
        | libc::SYS_swapon
        | libc::SYS_chroot
        // creat == open(O_CREAT|O_WRONLY|O_TRUNC)
        | libc::SYS_creat
        | libc::SYS_truncate => {}

        // These syscalls don't follow a trailing symlink.
        libc::SYS_unlink | libc::SYS_mknod | libc::SYS_mkdir | libc::SYS_lchown => {
            skip_last_element = true;
        }

        libc::SYS_unlinkat | libc::SYS_mknodat | libc::SYS_mkdirat => {
            fd_arg = Some(event_fd(event, 0)?);
            skip_last_element = true;
        }

        libc::SYS_open => {
            let flags = OpenFlags::from_event_arg(event.arg(1)?);
            if flags.intersects(OpenFlags::O_NOFOLLOW | OpenFlags::O_EXCL) {
                skip_last_element = true;
            }
        }

        libc::SYS_openat => {
            fd_arg = Some(event_fd(event, 0)?);
            let flags = OpenFlags::from_event_arg(event.arg(2)?);
            if flags.intersects(OpenFlags::O_NOFOLLOW | OpenFlags::O_EXCL) {
                skip_last_element = true;
            }
        }

        libc::SYS_fchmodat => {
            fd_arg = Some(event_fd(event, 0)?);
            // fchmodat has a no-follow flag in its signature, but the kernel
            // rejects it, so it is not examined here.
        }

        libc::SYS_fchownat => {
            fd_arg = Some(event_fd(event, 0)?);
            let flags = event_at_flags(event, 4)?;
            if flags.contains(AtFlags::EMPTY_PATH) && path.as_os_str().is_empty() {
                return Ok(false);
            }
            if flags.contains(AtFlags::SYMLINK_NOFOLLOW) {
                skip_last_element = true;
            }
        }

        libc::SYS_execveat => {
            fd_arg = Some(event_fd(event, 0)?);
            let flags = event_at_flags(event, 4)?;
            if flags.contains(AtFlags::EMPTY_PATH) && path.as_os_str().is_empty() {
                return Ok(false);
            }
            if file_is_user_writable(proc_info, &path, fd_arg).unwrap_or(false) {
                return Ok(true);
            }
            if flags.contains(AtFlags::SYMLINK_NOFOLLOW) {
                skip_last_element = true;
            }
        }

        libc::SYS_execve => {
            if file_is_user_writable(proc_info, &path, None).unwrap_or(false) {
                return Ok(true);
            }
        }

        libc::SYS_umount2 => {
            let flags = event.arg(1)? as libc::c_int;
            if (flags & libc::UMOUNT_NOFOLLOW) != 0 {
                skip_last_element = true;
            }
        }

        libc::SYS_name_to_handle_at => {
            let flags = event_at_flags(event, 4)?;
            if flags.contains(AtFlags::EMPTY_PATH) && path.as_os_str().is_empty() {
                return Ok(false);
            }
            if !flags.contains(AtFlags::SYMLINK_FOLLOW) {
                skip_last_element = true;
            }
        }

        libc::SYS_rename => {
            skip_last_element = true;
            let other_path = event.path_arg(1)?;
            if path_is_user_controlled(proc_info, dirname(other_path), None).unwrap_or(false) {
                return Ok(true);
            }
        }

        libc::SYS_renameat | libc::SYS_renameat2 => {
            skip_last_element = true;
            fd_arg = Some(event_fd(event, 0)?);
            let new_dirfd = event_fd(event, 2)?;
            let new_path = event.path_arg(1)?;
            if path_is_user_controlled(proc_info, dirname(new_path), Some(new_dirfd))
                .unwrap_or(false)
            {
                return Ok(true);
            }
        }

        libc::SYS_link => {
            let new_path = event.path_arg(1)?;
            if path_is_user_controlled(proc_info, dirname(new_path), None).unwrap_or(false) {
                return Ok(true);
            }
        }

        libc::SYS_symlink => {
            // The link target is never dereferenced by symlink(2), so only
            // the new entry's parent chain gets audited.
            let new_path = event.path_arg(1)?;
            return path_is_user_controlled(proc_info, dirname(new_path), None);
        }

        libc::SYS_linkat => {
            fd_arg = Some(event_fd(event, 0)?);
            let new_path = event.path_arg(1)?;
            let new_dirfd = event_fd(event, 2)?;
            let flags = event_at_flags(event, 4)?;

            if path_is_user_controlled(proc_info, dirname(new_path), Some(new_dirfd))
                .unwrap_or(false)
            {
                return Ok(true);
            }

            if flags.contains(AtFlags::EMPTY_PATH) && path.as_os_str().is_empty() {
                return Ok(false);
            }
            if !flags.contains(AtFlags::SYMLINK_FOLLOW) {
                skip_last_element = true;
            }
        }

        libc::SYS_symlinkat => {
            // symlinkat(target, newdirfd, linkpath): the new-dir descriptor
            // sits at argument position 1.
            let new_path = event.path_arg(1)?;
            let new_dirfd = event_fd(event, 1)?;
            return path_is_user_controlled(proc_info, dirname(new_path), Some(new_dirfd));
        }

        libc::SYS_mount => {
            let target = event.path_arg(1)?;
            let flags = event.arg(3)?;

            if path_is_user_controlled(proc_info, target, None).unwrap_or(false) {
                return Ok(true);
            }

            // The source is only a path for bind mounts and moves.
            if (flags & (libc::MS_BIND | libc::MS_MOVE)) == 0 {
                return Ok(false);
            }
        }

        nr => {
            log::error!("unexpected syscall number: {nr}");
            return Err(ErrorImpl::NotImplemented {
                feature: format!("syscall {nr}").into(),
            }
            .into());
        }
    }

    if skip_last_element {
        path = dirname(&path).into();
    }

    path_is_user_controlled(proc_info, &path, fd_arg)
}
