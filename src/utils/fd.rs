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
    syscalls,
};

use std::os::unix::io::AsFd;

use rustix::{fs::IFlags, io::Errno};

/// Filesystems whose directory entries are synthesised by the kernel
/// per-process and therefore cannot be replaced by an unprivileged user.
const SYNTHETIC_FILESYSTEMS: [i64; 3] = [
    libc::PROC_SUPER_MAGIC,    // procfs
    libc::CGROUP_SUPER_MAGIC,  // cgroupfs v1
    libc::CGROUP2_SUPER_MAGIC, // cgroupfs v2
];

pub(crate) trait FdExt {
    /// Check whether the inode has `FS_IMMUTABLE_FL` set.
    ///
    /// An immutable inode cannot be modified even by root, so a component
    /// with the flag set cannot be raced. Filesystems without inode-flag
    /// support answer `ENOTTY`, which simply means "not immutable" here.
    ///
    /// The descriptor must not be `O_PATH` — the inode-flags ioctl rejects
    /// those.
    fn is_immutable(&self) -> Result<bool, Error>;

    /// Check whether the descriptor resides on procfs.
    fn is_procfs(&self) -> Result<bool, Error>;

    /// Check whether the descriptor resides on a synthetic (procfs or
    /// cgroupfs) filesystem.
    fn on_synthetic_filesystem(&self) -> Result<bool, Error>;
}

impl<Fd: AsFd> FdExt for Fd {
    fn is_immutable(&self) -> Result<bool, Error> {
        match syscalls::ioctl_getflags(self) {
            Ok(flags) => Ok(flags.contains(IFlags::IMMUTABLE)),
            Err(err) if err.errno() == Errno::NOTTY => Ok(false),
            Err(err) => Err(ErrorImpl::RawOsError {
                operation: "check immutable flag".into(),
                source: err,
            })?,
        }
    }

    fn is_procfs(&self) -> Result<bool, Error> {
        let statfs = syscalls::fstatfs(self).map_err(|err| ErrorImpl::RawOsError {
            operation: "check filesystem type".into(),
            source: err,
        })?;
        Ok(statfs.f_type == libc::PROC_SUPER_MAGIC)
    }

    fn on_synthetic_filesystem(&self) -> Result<bool, Error> {
        let statfs = syscalls::fstatfs(self).map_err(|err| ErrorImpl::RawOsError {
            operation: "check filesystem type".into(),
            source: err,
        })?;
        Ok(SYNTHETIC_FILESYSTEMS.contains(&statfs.f_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{flags::OpenFlags, syscalls};

    use anyhow::Error;

    #[test]
    fn proc_is_procfs() -> Result<(), Error> {
        let proc = syscalls::open("/proc/self", OpenFlags::O_RDONLY | OpenFlags::O_DIRECTORY)?;
        assert!(proc.is_procfs()?);
        assert!(proc.on_synthetic_filesystem()?);
        Ok(())
    }

    #[test]
    fn root_is_not_synthetic() -> Result<(), Error> {
        let root = syscalls::open("/", OpenFlags::O_RDONLY | OpenFlags::O_DIRECTORY)?;
        assert!(!root.is_procfs()?);
        assert!(!root.on_synthetic_filesystem()?);
        Ok(())
    }

    #[test]
    fn ordinary_file_is_not_immutable() -> Result<(), Error> {
        let passwd = syscalls::open("/etc/passwd", OpenFlags::O_RDONLY)?;
        assert!(!passwd.is_immutable()?);
        Ok(())
    }
}
