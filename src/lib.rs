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

//! pathauditor detects filesystem syscalls that are vulnerable to
//! time-of-check-to-time-of-use (TOCTOU) races in privileged processes.
//!
//! Given an intercepted syscall (a [`FileEvent`]), the auditor walks every
//! path the call operates on inside the issuing process's filesystem
//! namespace — mirroring the kernel's own resolution: relative starting
//! directories, symlink chasing, procfs magic-links — and decides whether
//! any component could be replaced by an unprivileged user. If one could,
//! the user could have swapped a directory for a symlink and redirected the
//! privileged operation to a target of their choosing.
//!
//! The auditor only classifies; it never blocks or modifies the call. It is
//! best-effort by nature: the filesystem can change under the walk, and only
//! the kernel has the authoritative view.
//!
//! # Examples
//!
//! Auditing a call made by the current process:
//!
//! ```
//! use pathauditor::{FileEvent, SameProcessInformation};
//!
//! # fn main() -> Result<(), pathauditor::Error> {
//! let event = FileEvent::new(
//!     libc::SYS_open,
//!     vec![0, libc::O_RDONLY as u64, 0],
//!     vec!["/etc/passwd".into()],
//! );
//! let verdict = pathauditor::file_event_is_user_controlled(&SameProcessInformation, &event)?;
//! assert!(!verdict);
//! # Ok(())
//! # }
//! ```
//!
//! A path can also be audited directly, e.g. in the view of another process:
//!
//! ```no_run
//! use pathauditor::RemoteProcessInformation;
//!
//! # fn main() -> Result<(), pathauditor::Error> {
//! let proc_info = RemoteProcessInformation::new(1234, "/var/lib/daemon").with_fallback(true);
//! let verdict = pathauditor::path_is_user_controlled(&proc_info, "spool/job", None)?;
//! # Ok(())
//! # }
//! ```

// pathauditor only supports Linux.
#![cfg(target_os = "linux")]

mod dispatch;
pub use dispatch::file_event_is_user_controlled;

mod error;
pub use error::{Error, ErrorKind};

mod event;
pub use event::FileEvent;

mod flags;
pub use flags::OpenFlags;

mod logging;
pub use logging::{audit_file_event, log_audit_error, log_insecure_access, TEST_ENV_VAR};

mod process;
pub use process::{ProcessInformation, RemoteProcessInformation, SameProcessInformation};

mod walker;
pub use walker::{
    path_is_user_controlled, path_is_user_controlled_with_limit, DEFAULT_MAX_WALK_ITERATIONS,
};

// Internally used helpers.
mod syscalls;
mod utils;
