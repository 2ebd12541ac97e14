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

//! Error types for pathauditor.

use crate::syscalls::Error as SyscallError;

use std::borrow::Cow;

/// Opaque error type for pathauditor.
///
/// If you wish to do non-trivial error handling with pathauditor errors, use
/// [`Error::kind`] to get an [`ErrorKind`] you can handle programmatically.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] Box<ErrorImpl>);

impl<E: Into<ErrorImpl>> From<E> for Error {
    #[doc(hidden)]
    fn from(err: E) -> Self {
        Self(Box::new(err.into()))
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ErrorImpl {
    #[error("no audit policy for {feature}")]
    NotImplemented { feature: Cow<'static, str> },

    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("{description}")]
    ResourceExhausted { description: Cow<'static, str> },

    #[error("precondition failed: {description}")]
    FailedPrecondition { description: Cow<'static, str> },

    #[error("{operation} failed")]
    RawOsError {
        operation: Cow<'static, str>,
        source: SyscallError,
    },

    #[error("{context}")]
    Wrapped {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

/// Underlying error class for pathauditor errors.
///
/// This is similar in concept to [`std::io::ErrorKind`], and mirrors the
/// canonical status codes of the auditor: an audit either cannot address the
/// request ([`OutOfRange`], [`NotImplemented`]) or cannot classify the path
/// ([`FailedPrecondition`], [`ResourceExhausted`]).
///
/// [`OutOfRange`]: Self::OutOfRange
/// [`NotImplemented`]: Self::NotImplemented
/// [`FailedPrecondition`]: Self::FailedPrecondition
/// [`ResourceExhausted`]: Self::ResourceExhausted
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A [`FileEvent`] accessor was asked for an argument index past the end
    /// of the event's argument sequences.
    ///
    /// [`FileEvent`]: crate::FileEvent
    OutOfRange,
    /// The dispatcher has no policy for the event's syscall number.
    NotImplemented,
    /// A filesystem call made during the walk failed in a way that prevents
    /// classification (anything other than the entry not existing).
    FailedPrecondition,
    /// The walk processed more components than its iteration cap allows,
    /// which almost always means a symlink loop.
    ResourceExhausted,
}

impl ErrorImpl {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            // Both "the state makes no sense" and "a syscall failed
            // unclassifiably" stop the audit the same way, so they share a
            // kind.
            Self::FailedPrecondition { .. } | Self::RawOsError { .. } => {
                ErrorKind::FailedPrecondition
            }
            Self::Wrapped { source, .. } => source.kind(),
        }
    }
}

// Private trait necessary to work around the "orphan trait" restriction.
pub(crate) trait ErrorExt: Sized {
    /// Wrap a `Result<..., Error>` with an additional context string.
    fn wrap<S: Into<String>>(self, context: S) -> Self {
        self.with_wrap(|| context.into())
    }

    /// Wrap a `Result<..., Error>` with an additional context string created
    /// by a closure.
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String;
}

impl ErrorExt for ErrorImpl {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        Self::Wrapped {
            context: context_fn().into(),
            source: self.into(),
        }
    }
}

impl ErrorExt for Error {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.0.with_wrap(context_fn).into()
    }
}

impl<T, E: ErrorExt> ErrorExt for Result<T, E> {
    fn with_wrap<F>(self, context_fn: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| err.with_wrap(context_fn))
    }
}
