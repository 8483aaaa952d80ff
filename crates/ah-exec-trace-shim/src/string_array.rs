// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owned, NULL-terminated arrays of C strings.
//!
//! `StringArray` is the currency the interceptor uses for argv and envp: it
//! owns every string and keeps a parallel pointer table whose last slot is
//! always NULL, so `as_ptr()` can be handed straight to `execve`-style calls.

use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::ptr;

use crate::error::ShimError;

pub struct StringArray {
    strings: Vec<CString>,
    /// `strings[i].as_ptr()` for every index, followed by one NULL.
    pointers: Vec<*const c_char>,
}

impl StringArray {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            pointers: vec![ptr::null()],
        }
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, ShimError> {
        let mut array = Self::new();
        array.reserve(capacity)?;
        Ok(array)
    }

    /// Count the entries of a raw NULL-terminated array. A NULL array is empty.
    ///
    /// # Safety
    /// `array` must be NULL or point to a NULL-terminated array of pointers.
    pub unsafe fn raw_len(array: *const *const c_char) -> usize {
        if array.is_null() {
            return 0;
        }
        let mut len = 0;
        while !(*array.add(len)).is_null() {
            len += 1;
        }
        len
    }

    /// Deep-copy a raw NULL-terminated array. A NULL array yields an empty one.
    ///
    /// # Safety
    /// `array` must be NULL or point to a NULL-terminated array of valid C strings.
    pub unsafe fn copy_from_raw(array: *const *const c_char) -> Result<Self, ShimError> {
        let len = Self::raw_len(array);
        let mut copy = Self::with_capacity(len)?;
        for index in 0..len {
            copy.append(CStr::from_ptr(*array.add(index)).to_owned())?;
        }
        Ok(copy)
    }

    /// Collect a variadic argument list: `first` followed by `rest` up to the
    /// first NULL. A NULL `first` yields an empty array.
    ///
    /// # Safety
    /// Every non-NULL pointer before the terminator must be a valid C string.
    pub unsafe fn build_from_variadic<I>(first: *const c_char, rest: I) -> Result<Self, ShimError>
    where
        I: IntoIterator<Item = *const c_char>,
    {
        let mut array = Self::new();
        for arg in std::iter::once(first).chain(rest) {
            if arg.is_null() {
                break;
            }
            array.append(CStr::from_ptr(arg).to_owned())?;
        }
        Ok(array)
    }

    /// The pointers of a raw NULL-terminated array, terminator included.
    /// A NULL array yields nothing.
    ///
    /// # Safety
    /// `array` must be NULL or point to a NULL-terminated array of pointers
    /// that outlives the iterator.
    pub unsafe fn raw_entries(array: *const *const c_char) -> impl Iterator<Item = *const c_char> {
        let mut index = 0;
        let mut done = array.is_null();
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let next = unsafe { *array.add(index) };
            index += 1;
            done = next.is_null();
            Some(next)
        })
    }

    /// Append `value`, keeping the NULL terminator last.
    pub fn append(&mut self, value: CString) -> Result<(), ShimError> {
        self.reserve(1)?;
        let terminator = self.pointers.len() - 1;
        self.pointers.insert(terminator, value.as_ptr());
        self.strings.push(value);
        Ok(())
    }

    /// Replace the entry at `index`, returning the previous string.
    pub fn replace(&mut self, index: usize, value: CString) -> CString {
        let pointer = value.as_ptr();
        let previous = std::mem::replace(&mut self.strings[index], value);
        self.pointers[index] = pointer;
        previous
    }

    pub fn remove(&mut self, index: usize) -> CString {
        let removed = self.strings.remove(index);
        self.pointers.remove(index);
        removed
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.strings.get(index).map(CString::as_c_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// The NULL-terminated pointer table. Valid while `self` is alive and
    /// unmodified.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    fn reserve(&mut self, additional: usize) -> Result<(), ShimError> {
        self.strings
            .try_reserve(additional)
            .and_then(|()| self.pointers.try_reserve(additional))
            .map_err(|_| ShimError::OutOfMemory)
    }
}

impl Default for StringArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StringArray {
    fn clone(&self) -> Self {
        self.strings.iter().cloned().collect()
    }
}

impl FromIterator<CString> for StringArray {
    fn from_iter<T: IntoIterator<Item = CString>>(iter: T) -> Self {
        let strings: Vec<CString> = iter.into_iter().collect();
        let mut pointers: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        pointers.push(ptr::null());
        Self { strings, pointers }
    }
}

impl fmt::Debug for StringArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strings.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(items: &[&str]) -> StringArray {
        items.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    fn entries(array: &StringArray) -> Vec<String> {
        let len = unsafe { StringArray::raw_len(array.as_ptr()) };
        (0..len)
            .map(|i| unsafe { CStr::from_ptr(*array.as_ptr().add(i)) })
            .map(|entry| entry.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn raw_len_of_null_is_zero() {
        assert_eq!(unsafe { StringArray::raw_len(ptr::null()) }, 0);
        assert!(unsafe { StringArray::copy_from_raw(ptr::null()) }.unwrap().is_empty());
    }

    #[test]
    fn pointer_table_stays_null_terminated() {
        let mut strings = StringArray::new();
        assert!(unsafe { (*strings.as_ptr()).is_null() });

        strings.append(CString::new("a=1").unwrap()).unwrap();
        strings.append(CString::new("b=2").unwrap()).unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(entries(&strings), ["a=1", "b=2"]);
        assert!(unsafe { (*strings.as_ptr().add(2)).is_null() });
    }

    #[test]
    fn copy_is_deep_and_independent() {
        let original = array(&["cc", "-c", "a.c"]);
        let mut copy = unsafe { StringArray::copy_from_raw(original.as_ptr()) }.unwrap();
        copy.replace(0, CString::new("clang").unwrap());

        assert_eq!(entries(&original), ["cc", "-c", "a.c"]);
        assert_eq!(entries(&copy), ["clang", "-c", "a.c"]);
        assert_ne!(original.as_ptr(), copy.as_ptr());
    }

    #[test]
    fn variadic_collection_stops_at_null() {
        let first = CString::new("ls").unwrap();
        let second = CString::new("-l").unwrap();
        let ignored = CString::new("never").unwrap();
        let rest = [second.as_ptr(), ptr::null(), ignored.as_ptr()];

        let args = unsafe { StringArray::build_from_variadic(first.as_ptr(), rest) }.unwrap();
        assert_eq!(entries(&args), ["ls", "-l"]);

        let empty = unsafe { StringArray::build_from_variadic(ptr::null(), rest) }.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn raw_entries_end_with_the_terminator() {
        let args = array(&["sh", "-c", "true"]);
        let walked: Vec<_> = unsafe { StringArray::raw_entries(args.as_ptr()) }.collect();
        assert_eq!(walked.len(), 4);
        assert!(walked[3].is_null());

        let rest = unsafe { StringArray::raw_entries(args.as_ptr().add(1)) };
        let rebuilt = unsafe { StringArray::build_from_variadic(walked[0], rest) }.unwrap();
        assert_eq!(entries(&rebuilt), ["sh", "-c", "true"]);
        assert_eq!(unsafe { StringArray::raw_entries(ptr::null()) }.count(), 0);
    }

    #[test]
    fn remove_and_clone_keep_table_consistent() {
        let mut strings = array(&["A=1", "B=2", "A=3"]);
        let removed = strings.remove(2);
        assert_eq!(removed.to_str().unwrap(), "A=3");

        let cloned = strings.clone();
        assert_eq!(entries(&cloned), ["A=1", "B=2"]);
        assert_eq!(cloned.get(1).unwrap().to_str().unwrap(), "B=2");
        assert!(cloned.get(2).is_none());
    }
}
