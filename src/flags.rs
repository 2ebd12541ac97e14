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

//! Bit-flag wrappers used when opening directories and when decoding the
//! flag arguments of intercepted syscalls.

use bitflags::bitflags;

bitflags! {
    /// Wrapper for the underlying `libc`'s `O_*` flags.
    ///
    /// The flag values and their meaning is identical to the description in
    /// the `open(2)` man page. Only the flags the auditor itself opens
    /// directories with, plus the ones it inspects on intercepted `open(2)`
    /// and `openat(2)` events, are named; unknown bits are preserved.
    #[derive(Default, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct OpenFlags: libc::c_int {
        // Access modes (including O_PATH).
        const O_RDONLY = libc::O_RDONLY;
        const O_WRONLY = libc::O_WRONLY;
        const O_RDWR = libc::O_RDWR;
        const O_PATH = libc::O_PATH;

        // Fd flags.
        const O_CLOEXEC = libc::O_CLOEXEC;

        // Control lookups.
        const O_NOFOLLOW = libc::O_NOFOLLOW;
        const O_DIRECTORY = libc::O_DIRECTORY;
        const O_NOCTTY = libc::O_NOCTTY;

        // File creation.
        const O_CREAT = libc::O_CREAT;
        const O_EXCL = libc::O_EXCL;
        const O_TRUNC = libc::O_TRUNC;

        // Don't clobber unknown O_* bits.
        const _ = !0;
    }
}

impl OpenFlags {
    /// Decode the flags argument of an intercepted `open(2)`/`openat(2)`.
    pub(crate) fn from_event_arg(arg: u64) -> Self {
        Self::from_bits_retain(arg as libc::c_int)
    }
}

impl From<OpenFlags> for rustix::fs::OFlags {
    fn from(flags: OpenFlags) -> Self {
        Self::from_bits_retain(flags.bits() as std::ffi::c_uint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn event_arg_round_trip() {
        let raw = (libc::O_RDONLY | libc::O_NOFOLLOW | libc::O_CLOEXEC) as u64;
        let flags = OpenFlags::from_event_arg(raw);
        assert!(flags.contains(OpenFlags::O_NOFOLLOW));
        assert_eq!(flags.bits() as u64, raw);
    }

    #[test]
    fn unknown_bits_survive_conversion() {
        let flags = OpenFlags::from_bits_retain(0o4000000000_u32 as libc::c_int);
        let oflags: rustix::fs::OFlags = flags.into();
        assert_eq!(oflags.bits(), flags.bits() as std::ffi::c_uint);
    }
}
