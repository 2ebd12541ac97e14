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

//! Reporting for audit verdicts.
//!
//! Positive verdicts become `InsecureAccess` records and audit failures
//! become `Cannot audit` records, both written to the system log. When the
//! `PATHAUDITOR_TEST` environment variable is set, positive verdicts instead
//! emit a single `AUDITING:<function>` line on stderr (so a test harness can
//! check which libc entry points are covered) and the system log stays
//! quiet.

use crate::{
    dispatch::file_event_is_user_controlled, error::Error, event::FileEvent,
    process::ProcessInformation, syscalls,
};

use std::backtrace::Backtrace;

use once_cell::sync::Lazy;

/// Environment variable that redirects reports to stderr for tests.
pub const TEST_ENV_VAR: &str = "PATHAUDITOR_TEST";

/// The process's own command line, captured once.
///
/// `/proc/self/cmdline` separates arguments with NUL bytes; they become
/// spaces for readability.
static CMDLINE: Lazy<String> = Lazy::new(|| {
    match std::fs::read("/proc/self/cmdline") {
        Ok(raw) if !raw.is_empty() => raw
            .iter()
            .map(|&b| if b == 0 { b' ' } else { b })
            .map(char::from)
            .collect::<String>()
            .trim_end()
            .to_string(),
        _ => "(unknown)".to_string(),
    }
});

/// Report a syscall that operates on a user-controlled path.
///
/// The record names the intercepted libc function, the process cmdline, the
/// full event, the effective uid, and a stack trace of the call site.
pub fn log_insecure_access(event: &FileEvent, function_name: &str) {
    // For testing that functions get audited.
    if std::env::var_os(TEST_ENV_VAR).is_some() {
        eprintln!("AUDITING:{function_name}");
        return;
    }

    let record = format!(
        "function {}, cmdline {}, {}, uid {}, stack trace:\n{}",
        function_name,
        &*CMDLINE,
        event,
        syscalls::geteuid(),
        Backtrace::force_capture(),
    );
    syscalls::syslog(libc::LOG_WARNING, &format!("InsecureAccess: {record}"));
}

/// Report an audit that could not run to completion.
pub fn log_audit_error(err: &Error) {
    syscalls::syslog(libc::LOG_WARNING, &format!("Cannot audit: {err}"));
}

/// Audit one event and report the outcome.
///
/// This is the composition an interception layer calls from its overridden
/// libc entry points: dispatch the event, log `InsecureAccess` on a positive
/// verdict, log `Cannot audit` on failure, and return the verdict (`false`
/// when the audit failed). The caller must hold its thread-local re-entrancy
/// guard around this call, since the audit itself issues filesystem syscalls
/// the interception layer would otherwise see again.
pub fn audit_file_event<I>(proc_info: &I, event: &FileEvent, function_name: &str) -> bool
where
    I: ProcessInformation + ?Sized,
{
    match file_event_is_user_controlled(proc_info, event) {
        Ok(true) => {
            log_insecure_access(event, function_name);
            true
        }
        Ok(false) => false,
        Err(err) => {
            log_audit_error(&err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SameProcessInformation;

    use std::path::PathBuf;

    #[test]
    fn cmdline_is_captured() {
        // The test binary always has at least its own name on the cmdline.
        assert!(!CMDLINE.is_empty());
        assert_ne!(&*CMDLINE, "(unknown)");
    }

    #[test]
    fn audit_reports_safe_event_as_false() {
        let event = FileEvent::new(
            libc::SYS_open,
            vec![0, libc::O_RDONLY as u64, 0],
            vec![PathBuf::from("/etc/passwd")],
        );
        assert!(!audit_file_event(&SameProcessInformation, &event, "open"));
    }

    #[test]
    fn audit_swallows_dispatch_errors() {
        // No policy for getpid: the audit fails internally and the shim
        // must still be told to forward the call.
        let event = FileEvent::new(libc::SYS_getpid, vec![], vec![PathBuf::from("/")]);
        assert!(!audit_file_event(&SameProcessInformation, &event, "getpid"));
    }
}
