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

use std::{
    collections::VecDeque,
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
    path::Path,
};

/// `RawComponents` is like [`Components`] except that no normalisation is
/// done for any path components ([`Components`] normalises `"/./"`
/// components), and all of the components are simply [`OsStr`].
///
/// The walker needs this because its queue must mirror the kernel's view of
/// the path byte-for-byte; which components get skipped is walk policy, not a
/// property of the iterator.
///
/// [`Components`]: std::path::Components
#[derive(Debug)]
pub(crate) struct RawComponents<'a> {
    inner: Option<&'a OsStr>,
}

impl<'a> Iterator for RawComponents<'a> {
    type Item = &'a OsStr;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner {
            None => None,
            Some(inner) => {
                let (next, remaining) = match memchr::memchr(b'/', inner.as_bytes()) {
                    None => (inner, None),
                    Some(idx) => {
                        let (head, mut tail) = inner.as_bytes().split_at(idx);
                        tail = &tail[1..]; // strip slash
                        (OsStrExt::from_bytes(head), Some(OsStrExt::from_bytes(tail)))
                    }
                };
                self.inner = remaining;
                Some(next)
            }
        }
    }
}

impl RawComponents<'_> {
    /// Add these components to the front of a walk queue, in order, dropping
    /// empty components ("//" runs and leading/trailing slashes).
    pub(crate) fn prepend(self, deque: &mut VecDeque<OsString>) {
        self.filter(|p| !p.is_empty())
            .map(|p| p.to_os_string())
            .collect::<Vec<_>>()
            .into_iter()
            // VecDeque doesn't have an amortized way of prepending, so push
            // to the front in reverse.
            .rev()
            .for_each(|p| deque.push_front(p));
    }
}

pub(crate) trait PathIterExt {
    fn raw_components(&self) -> RawComponents<'_>;
}

impl PathIterExt for Path {
    fn raw_components(&self) -> RawComponents<'_> {
        RawComponents {
            inner: Some(self.as_os_str()),
        }
    }
}

impl<P: AsRef<Path>> PathIterExt for P {
    fn raw_components(&self) -> RawComponents<'_> {
        self.as_ref().raw_components()
    }
}

/// Everything up to the final `/` of the path, with the same conventions the
/// dispatcher's `skip_last` policy relies on: no separator at all yields an
/// empty path (which walks to an immediate `false`), and the root directory
/// is its own parent.
pub(crate) fn dirname(path: &Path) -> &Path {
    let bytes = path.as_os_str().as_bytes();
    match memchr::memrchr(b'/', bytes) {
        None => Path::new(""),
        Some(0) => Path::new("/"),
        Some(idx) => Path::new(OsStr::from_bytes(&bytes[..idx])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    macro_rules! dirname_tests {
        // dirname_tests! {
        //      abc("a/b" => "a");
        //      root("/" => "/");
        // }
        ($($test_name:ident ($path:expr => $parent:expr));* $(;)? ) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<dirname_ $test_name>]() {
                        let path: PathBuf = $path.into();
                        let want: PathBuf = $parent.into();
                        assert_eq!(
                            dirname(&path).as_os_str(),
                            want.as_os_str(),
                            "dirname({path:?}) gave the wrong parent",
                        );
                    }
                )*
            }
        };
    }

    dirname_tests! {
        empty("" => "");
        root("/" => "/");
        double_root("//" => "/");

        single("single" => "");
        single_root("/single" => "/");

        multi1("foo/bar" => "foo");
        multi2("/foo/bar/baz" => "/foo/bar");

        trailing_slash("/foo/bar/" => "/foo/bar");
        trailing_dot("/foo/." => "/foo");
    }

    #[test]
    fn raw_components_keeps_empties_and_dots() {
        let path = PathBuf::from("//a/./b/");
        let got: Vec<String> = path
            .raw_components()
            .map(|c| c.to_string_lossy().into_owned())
            .collect();
        assert_eq!(got, ["", "", "a", ".", "b", ""]);
    }

    #[test]
    fn prepend_skips_empty_components() {
        let mut queue: VecDeque<OsString> = VecDeque::from(["tail".into()]);
        Path::new("/x//y/").raw_components().prepend(&mut queue);
        let got: Vec<_> = queue.iter().map(|c| c.to_string_lossy().into_owned()).collect();
        assert_eq!(got, ["x", "y", "tail"]);
    }
}
