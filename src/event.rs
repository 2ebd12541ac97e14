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

use crate::error::{Error, ErrorImpl};

use std::{fmt, path::Path, path::PathBuf};

/// An intercepted filesystem syscall (`open`/`rename`/...).
///
/// The event carries the syscall number, the raw argument words in syscall
/// argument order, and the path strings the call operates on, in order. An
/// interception layer builds one `FileEvent` per intercepted call and hands
/// it to [`file_event_is_user_controlled`]; the event is immutable from then
/// on.
///
/// Argument words occupy the same positions they do in the syscall signature,
/// so e.g. the flags of `openat(2)` are at [`arg(2)`] (path positions carry
/// placeholder values).
///
/// [`file_event_is_user_controlled`]: crate::file_event_is_user_controlled
/// [`arg(2)`]: Self::arg
#[derive(Clone, Debug)]
pub struct FileEvent {
    syscall_nr: libc::c_long,
    args: Vec<u64>,
    path_args: Vec<PathBuf>,
}

impl FileEvent {
    pub fn new(syscall_nr: libc::c_long, args: Vec<u64>, path_args: Vec<PathBuf>) -> Self {
        Self {
            syscall_nr,
            args,
            path_args,
        }
    }

    pub fn syscall_nr(&self) -> libc::c_long {
        self.syscall_nr
    }

    /// The raw argument word at syscall argument position `idx`.
    pub fn arg(&self, idx: usize) -> Result<u64, Error> {
        self.args.get(idx).copied().ok_or_else(|| {
            ErrorImpl::OutOfRange {
                index: idx,
                len: self.args.len(),
            }
            .into()
        })
    }

    /// The `idx`-th path argument of the syscall.
    pub fn path_arg(&self, idx: usize) -> Result<&Path, Error> {
        self.path_args.get(idx).map(PathBuf::as_path).ok_or_else(|| {
            ErrorImpl::OutOfRange {
                index: idx,
                len: self.path_args.len(),
            }
            .into()
        })
    }

    pub fn args(&self) -> &[u64] {
        &self.args
    }

    pub fn path_args(&self) -> &[PathBuf] {
        &self.path_args
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syscall_nr: {}, args: [", self.syscall_nr)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, "], path_args: [")?;
        for (i, path) in self.path_args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    use pretty_assertions::assert_eq;

    #[test]
    fn returns_syscall_nr() {
        let event = FileEvent::new(libc::SYS_open, vec![0], vec![PathBuf::from("/foo")]);
        assert_eq!(event.syscall_nr(), libc::SYS_open);
    }

    #[test]
    fn argument_access() -> Result<(), Error> {
        let event = FileEvent::new(
            libc::SYS_open,
            vec![10, 20],
            vec![PathBuf::from("/foo"), PathBuf::from("/bar")],
        );
        assert_eq!(event.arg(0)?, 10);
        assert_eq!(event.arg(1)?, 20);
        assert_eq!(event.path_arg(0)?, Path::new("/foo"));
        assert_eq!(event.path_arg(1)?, Path::new("/bar"));
        Ok(())
    }

    #[test]
    fn empty_arguments() {
        let event = FileEvent::new(libc::SYS_open, vec![], Vec::<PathBuf>::new());
        assert_eq!(
            event.arg(0).expect_err("arg past end").kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(
            event.path_arg(0).expect_err("path arg past end").kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn display_format() {
        let event = FileEvent::new(
            libc::SYS_rename,
            vec![1, 2],
            vec![PathBuf::from("/a"), PathBuf::from("/b")],
        );
        assert_eq!(
            event.to_string(),
            format!(
                "syscall_nr: {}, args: [1, 2], path_args: [/a, /b]",
                libc::SYS_rename
            )
        );
    }
}
