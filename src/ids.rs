//! Append-only id column with a two-level binary search over a sorted view.

use rayon::slice::ParallelSliceMut;

/// Every 256th sorted id is kept as an anchor so lookup can first binary
/// search a small anchor array, then a single 256-wide window.
const BLOCK_SIZE: usize = 256;

/// An append-only `i64` id vector. Before `finalize`, only `add`/`len` are
/// available; after `finalize`, `get_index_from_id` does O(log n) lookup.
#[derive(Debug, Default)]
pub struct Ids {
    ids: Vec<i64>,
    sorted: bool,
    finalized: Option<FinalizedIds>,
}

#[derive(Debug)]
struct FinalizedIds {
    sorted_ids: Vec<i64>,
    // Maps a position in `sorted_ids` back to the original insertion index.
    // Identity when the input arrived already sorted.
    sorted_pos_to_index: Vec<u32>,
    anchors: Vec<i64>,
}

impl Ids {
    pub fn new() -> Ids {
        Ids {
            ids: Vec::new(),
            sorted: true,
            finalized: None,
        }
    }

    /// Appends `id`, returning its insertion index.
    pub fn add(&mut self, id: i64) -> u32 {
        assert!(self.finalized.is_none(), "Ids::add called after finalize");
        if let Some(&last) = self.ids.last() {
            if id < last {
                self.sorted = false;
            }
        }
        let idx = self.ids.len() as u32;
        self.ids.push(id);
        idx
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the id originally inserted at `index`.
    pub fn at(&self, index: u32) -> i64 {
        self.ids[index as usize]
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Compacts storage and builds the sorted-id anchor index. Idempotent:
    /// a second call is a no-op.
    pub fn finalize(&mut self) {
        if self.finalized.is_some() {
            return;
        }
        self.ids.shrink_to_fit();

        let n = self.ids.len();
        let (sorted_ids, sorted_pos_to_index) = if self.sorted {
            (self.ids.clone(), (0..n as u32).collect())
        } else {
            let mut order: Vec<u32> = (0..n as u32).collect();
            order.par_sort_by_key(|&i| self.ids[i as usize]);
            let sorted_ids = order.iter().map(|&i| self.ids[i as usize]).collect();
            (sorted_ids, order)
        };

        let anchors = build_anchors(&sorted_ids);

        self.finalized = Some(FinalizedIds {
            sorted_ids,
            sorted_pos_to_index,
            anchors,
        });
    }

    /// Two-level binary search: locate the anchor block, then the id within
    /// it. Returns -1 on miss. Panics if the store hasn't been finalized.
    pub fn get_index_from_id(&self, id: i64) -> i64 {
        let fin = self
            .finalized
            .as_ref()
            .expect("Ids::get_index_from_id called before finalize");

        if fin.sorted_ids.is_empty() {
            return -1;
        }

        // Largest j with anchors[j] <= id.
        let block = match fin.anchors.binary_search(&id) {
            Ok(j) => j,
            Err(0) => return -1,
            Err(j) => j - 1,
        };

        let start = block * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(fin.sorted_ids.len());
        match fin.sorted_ids[start..end].binary_search(&id) {
            Ok(offset) => {
                let pos = start + offset;
                if self.sorted {
                    pos as i64
                } else {
                    fin.sorted_pos_to_index[pos] as i64
                }
            }
            Err(_) => -1,
        }
    }

    pub fn has(&self, id: i64) -> bool {
        self.get_index_from_id(id) >= 0
    }
}

fn build_anchors(sorted_ids: &[i64]) -> Vec<i64> {
    if sorted_ids.is_empty() {
        return Vec::new();
    }
    let n = sorted_ids.len();
    let num_blocks = n.div_ceil(BLOCK_SIZE);
    (0..num_blocks)
        .map(|j| sorted_ids[(j * BLOCK_SIZE).min(n - 1)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_round_trips_for_already_sorted_input() {
        let mut ids = Ids::new();
        for i in 0..1000i64 {
            ids.add(i * 2);
        }
        ids.finalize();
        for i in 0..1000 {
            assert_eq!(ids.get_index_from_id(i * 2), i);
        }
        assert_eq!(ids.get_index_from_id(3), -1);
    }

    #[test]
    fn lookup_round_trips_for_unsorted_input() {
        let mut ids = Ids::new();
        let inserted = [50, 10, 99999, -7, 3, 3000, -1000];
        for &id in &inserted {
            ids.add(id);
        }
        ids.finalize();
        for (idx, &id) in inserted.iter().enumerate() {
            assert_eq!(ids.get_index_from_id(id), idx as i64);
            assert_eq!(ids.at(idx as u32), id);
        }
        assert_eq!(ids.get_index_from_id(123456789), -1);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut ids = Ids::new();
        ids.add(5);
        ids.add(1);
        ids.finalize();
        let before = ids.get_index_from_id(1);
        ids.finalize();
        assert_eq!(ids.get_index_from_id(1), before);
    }

    #[test]
    fn anchors_span_many_blocks() {
        let mut ids = Ids::new();
        for i in 0..10_000i64 {
            ids.add(10_000 - i); // descending: forces a real sort
        }
        ids.finalize();
        for i in 0..10_000i64 {
            let id = 10_000 - i;
            assert_eq!(ids.get_index_from_id(id), i);
        }
    }

    #[test]
    #[should_panic(expected = "after finalize")]
    fn add_after_finalize_panics() {
        let mut ids = Ids::new();
        ids.add(1);
        ids.finalize();
        ids.add(2);
    }
}
