//! Per-entity tag storage (CSR over string-table indexes) plus a reverse
//! key → entity index.

use std::collections::BTreeMap;

/// Tags for a sequence of entities, stored as two parallel CSR arrays
/// (`tag_keys`/`tag_vals`) addressed by `tag_start`/`tag_count`, plus a
/// reverse index from string-table key index to the entities carrying it.
#[derive(Debug, Default)]
pub struct Tags {
    tag_start: Vec<u32>,
    tag_count: Vec<u32>,
    tag_keys: Vec<u32>,
    tag_vals: Vec<u32>,

    // Transient fill-time builder: key index -> entity indexes that carry it.
    // Replaced by the flat key_* arrays on finalize.
    builder: BTreeMap<u32, Vec<u32>>,

    key_entities: Vec<u32>,
    key_index_start: Vec<u32>,
    key_index_count: Vec<u32>,
    finalized: bool,
}

impl Tags {
    pub fn new() -> Tags {
        Tags::default()
    }

    pub fn len(&self) -> usize {
        self.tag_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_start.is_empty()
    }

    /// Appends a tag set for the next entity index (`entity_idx` must equal
    /// the current `len()`, matching the parallel id/tag columns).
    pub fn add_tags(&mut self, entity_idx: u32, kv: &[(u32, u32)]) {
        assert!(!self.finalized, "Tags::add_tags called after finalize");
        assert_eq!(entity_idx as usize, self.tag_start.len(), "Tags fill must be in entity order");

        self.tag_start.push(self.tag_keys.len() as u32);
        self.tag_count.push(kv.len() as u32);
        for &(k, v) in kv {
            self.tag_keys.push(k);
            self.tag_vals.push(v);
            self.builder.entry(k).or_default().push(entity_idx);
        }
    }

    /// PBF-shaped entry point: parallel key/val string-table index slices.
    pub fn add_tag_key_vals(&mut self, entity_idx: u32, keys: &[u32], vals: &[u32]) {
        assert_eq!(keys.len(), vals.len());
        let kv: Vec<(u32, u32)> = keys.iter().copied().zip(vals.iter().copied()).collect();
        self.add_tags(entity_idx, &kv);
    }

    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.tag_start.shrink_to_fit();
        self.tag_count.shrink_to_fit();
        self.tag_keys.shrink_to_fit();
        self.tag_vals.shrink_to_fit();

        for (&key, entities) in &self.builder {
            let start = self.key_entities.len() as u32;
            self.key_index_start.resize(key as usize + 1, 0);
            self.key_index_count.resize(key as usize + 1, 0);
            self.key_index_start[key as usize] = start;
            self.key_index_count[key as usize] = entities.len() as u32;
            self.key_entities.extend_from_slice(entities);
        }
        self.builder = BTreeMap::new();
        self.finalized = true;
    }

    /// The `(key_idx, val_idx)` pairs for entity `e`, or `None` if it carries
    /// no tags.
    pub fn get_tags(&self, e: u32) -> Option<Vec<(u32, u32)>> {
        let count = self.tag_count[e as usize];
        if count == 0 {
            return None;
        }
        let start = self.tag_start[e as usize] as usize;
        let end = start + count as usize;
        Some(
            self.tag_keys[start..end]
                .iter()
                .copied()
                .zip(self.tag_vals[start..end].iter().copied())
                .collect(),
        )
    }

    pub fn cardinality(&self, e: u32) -> u32 {
        self.tag_count[e as usize]
    }

    /// All entity indexes carrying `key_idx`. Empty for a negative or
    /// out-of-range key (e.g. a key that's absent from the StringTable).
    pub fn has_key(&self, key_idx: i32) -> &[u32] {
        assert!(self.finalized, "Tags::has_key called before finalize");
        if key_idx < 0 || key_idx as usize >= self.key_index_start.len() {
            return &[];
        }
        let start = self.key_index_start[key_idx as usize] as usize;
        let count = self.key_index_count[key_idx as usize] as usize;
        &self.key_entities[start..start + count]
    }

    /// A dense composite key for a (key, val) pair, useful as a cache key
    /// when `len` (the StringTable size) is known by the caller.
    pub fn kv_to_index(key_idx: u32, val_idx: u32, string_table_len: u32) -> u64 {
        key_idx as u64 * string_table_len as u64 + val_idx as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_tags_returns_none_for_untagged_entity() {
        let mut t = Tags::new();
        t.add_tags(0, &[]);
        t.finalize();
        assert_eq!(t.get_tags(0), None);
        assert_eq!(t.cardinality(0), 0);
    }

    #[test]
    fn get_tags_round_trips() {
        let mut t = Tags::new();
        t.add_tags(0, &[(1, 2), (3, 4)]);
        t.add_tags(1, &[]);
        t.add_tags(2, &[(1, 5)]);
        t.finalize();

        assert_eq!(t.get_tags(0), Some(vec![(1, 2), (3, 4)]));
        assert_eq!(t.get_tags(1), None);
        assert_eq!(t.cardinality(2), 1);
    }

    #[test]
    fn has_key_indexes_all_carriers() {
        let mut t = Tags::new();
        t.add_tags(0, &[(7, 1)]);
        t.add_tags(1, &[(8, 1)]);
        t.add_tags(2, &[(7, 2)]);
        t.finalize();

        assert_eq!(t.has_key(7), &[0, 2]);
        assert_eq!(t.has_key(8), &[1]);
        assert_eq!(t.has_key(999), &[] as &[u32]);
        assert_eq!(t.has_key(-1), &[] as &[u32]);
    }

    #[test]
    fn add_tag_key_vals_matches_add_tags() {
        let mut a = Tags::new();
        a.add_tags(0, &[(1, 2), (3, 4)]);
        a.finalize();

        let mut b = Tags::new();
        b.add_tag_key_vals(0, &[1, 3], &[2, 4]);
        b.finalize();

        assert_eq!(a.get_tags(0), b.get_tags(0));
    }

    #[test]
    #[should_panic(expected = "after finalize")]
    fn add_after_finalize_panics() {
        let mut t = Tags::new();
        t.add_tags(0, &[]);
        t.finalize();
        t.add_tags(1, &[]);
    }
}
