//! Deduplicated UTF-8 string arena, indexed by a stable `u32`.

use std::collections::HashMap;

use crate::error::{Error, ErrorKind, Result};

/// An ordered sequence of unique UTF-8 strings addressed by a dense `u32`
/// index. `add` returns the same index for the same string; bytes are never
/// removed, and indexing is stable for the lifetime of the table.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    // Lazily (re)built: after cross-process transport a table may be
    // hydrated with `strings` only, and `find` rebuilds this on first call.
    index: Option<HashMap<String, u32>>,
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable {
            strings: Vec::new(),
            index: Some(HashMap::new()),
        }
    }

    /// Builds a table from already-decoded strings with no reverse index;
    /// `find` will build one lazily on first use. This is the shape a
    /// transported store arrives in.
    pub fn from_strings(strings: Vec<String>) -> StringTable {
        StringTable { strings, index: None }
    }

    /// Returns the existing index for `s` if present, else appends it.
    pub fn add(&mut self, s: &str) -> u32 {
        self.ensure_index();
        if let Some(&idx) = self.index.as_ref().unwrap().get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.as_mut().unwrap().insert(s.to_string(), idx);
        idx
    }

    /// Decodes raw string-table bytes (as they arrive from a PBF block) and
    /// adds them, reporting a recoverable error on invalid UTF-8 rather than
    /// panicking, since the bytes come from untrusted input.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<u32> {
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(self.add(s)),
            Err(err) => Err(Error::new(ErrorKind::StringTableUtf8 {
                err,
                index: self.strings.len() as u32,
            })),
        }
    }

    /// Returns the string at `i`. Out-of-range access is a programmer error.
    pub fn get(&self, i: u32) -> &str {
        &self.strings[i as usize]
    }

    /// Returns the index of `s`, or -1 if absent. Rebuilds the reverse map
    /// lazily if this table was hydrated without one.
    pub fn find(&mut self, s: &str) -> i32 {
        self.ensure_index();
        match self.index.as_ref().unwrap().get(s) {
            Some(&idx) => idx as i32,
            None => -1,
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    fn ensure_index(&mut self) {
        if self.index.is_none() {
            let mut map = HashMap::with_capacity(self.strings.len());
            for (i, s) in self.strings.iter().enumerate() {
                map.insert(s.clone(), i as u32);
            }
            self.index = Some(map);
        }
    }
}
