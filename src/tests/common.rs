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

use std::{fs, path::Path};

use anyhow::{Context, Error};
use rustix::fs::{self as rustix_fs, Mode};

/// A uid that is never root, for handing entries to "some other user".
pub(crate) const UNPRIVILEGED_UID: u32 = 65534;

pub(crate) fn mkdir_mode<P: AsRef<Path>>(path: P, mode: u32) -> Result<(), Error> {
    let path = path.as_ref();
    fs::create_dir(path).with_context(|| format!("mkdir {}", path.display()))?;
    // mkdir honours the umask, so the mode (sticky bit included) has to be
    // applied separately.
    rustix_fs::chmod(path, Mode::from_raw_mode(mode))
        .with_context(|| format!("chmod {:o} {}", mode, path.display()))
}

pub(crate) fn mkfile_mode<P: AsRef<Path>>(path: P, mode: u32) -> Result<(), Error> {
    let path = path.as_ref();
    fs::write(path, b"").with_context(|| format!("mkfile {}", path.display()))?;
    rustix_fs::chmod(path, Mode::from_raw_mode(mode))
        .with_context(|| format!("chmod {:o} {}", mode, path.display()))
}

/// Hand an entry to [`UNPRIVILEGED_UID`]. Needs root.
pub(crate) fn chown_unprivileged<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    let path = path.as_ref();
    std::os::unix::fs::chown(path, Some(UNPRIVILEGED_UID), Some(UNPRIVILEGED_UID))
        .with_context(|| format!("chown {}", path.display()))
}

/// Number of open file descriptors in this process.
///
/// The descriptor used to read `/proc/self/fd` is itself listed, but it is
/// listed in every measurement, so comparisons still hold.
pub(crate) fn open_fd_count() -> Result<usize, Error> {
    Ok(fs::read_dir("/proc/self/fd")
        .context("read /proc/self/fd")?
        .count())
}

macro_rules! skip_if_not_root {
    () => {
        if !rustix::process::geteuid().is_root() {
            eprintln!(
                "INFO: skipping {}, which asserts on root-owned trees",
                module_path!()
            );
            return Ok(());
        }
    };
}

macro_rules! create_inode {
    // "foo/bar" => (dir)
    ($path:expr => dir) => {
        crate::tests::common::mkdir_mode($path, 0o755)
    };
    // "foo/bar" => (dir 0o1777)
    ($path:expr => dir $mode:literal) => {
        crate::tests::common::mkdir_mode($path, $mode)
    };
    // "foo/bar" => (file)
    ($path:expr => file) => {
        crate::tests::common::mkfile_mode($path, 0o644)
    };
    // "foo/bar" => (file 0o755)
    ($path:expr => file $mode:literal) => {
        crate::tests::common::mkfile_mode($path, $mode)
    };
    // "foo/bar" => (symlink -> "target")
    ($path:expr => symlink -> $target:expr) => {
        std::os::unix::fs::symlink($target, $path)
            .map_err(|err| anyhow::anyhow!("symlink {:?}: {err}", $path))
    };
}

macro_rules! create_tree {
    // let root: TempDir = create_tree! {
    //     "a" => (dir);
    //     "a/b/x" => (file 0o755);
    //     "lnk" => (symlink -> "a/b");
    // };
    ($($subpath:expr => ($($inner:tt)*));+ $(;)*) => {{
        let root = tempfile::TempDir::new()?;
        $(
            {
                let root_dir: &std::path::Path = root.as_ref();
                let path = root_dir.join($subpath);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                crate::tests::common::create_inode!(&path => $($inner)*)?;
            }
        )*
        root
    }};
}

pub(crate) use {create_inode, create_tree, skip_if_not_root};
