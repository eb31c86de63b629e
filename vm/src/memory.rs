use std::collections::BTreeMap;

use crate::VMInt;

/// Cells past this address are kept in a sparse map instead of growing the buffer
const DENSE_LIMIT: usize = 1 << 20;

/// Memory of a intcode machine
///
/// Every address that was never written reads as 0. The low addresses are kept in a contiguous
/// buffer that grows on write, while far away cells (reachable through big relative bases) are
/// stored sparsely.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    dense: Vec<VMInt>,
    sparse: BTreeMap<usize, VMInt>,
}

impl Memory {
    /// Create a memory holding `program` from address 0
    pub fn new(program: &[VMInt]) -> Self {
        Self {
            dense: program.to_vec(),
            sparse: BTreeMap::new(),
        }
    }

    /// Read from the memory
    pub fn read(&self, pos: usize) -> VMInt {
        match self.dense.get(pos) {
            Some(value) => *value,
            None => self.sparse.get(&pos).copied().unwrap_or(0), // simulate infinite 0 memory
        }
    }

    /// Write to the memory
    pub fn write(&mut self, pos: usize, value: VMInt) {
        if pos < self.dense.len() {
            self.dense[pos] = value;
        } else if pos < DENSE_LIMIT {
            // sparse cells are all past the limit, so they are never shadowed by the resize
            self.dense.resize(pos + 1, 0);
            self.dense[pos] = value;
        } else {
            self.sparse.insert(pos, value);
        }
    }

    /// The contiguous part of the memory, starting from address 0
    pub fn as_slice(&self) -> &[VMInt] {
        &self.dense
    }

    /// Number of cells in the contiguous part
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty() && self.sparse.is_empty()
    }
}

/// Memories are equal when every address reads the same, however the cells are stored
impl PartialEq for Memory {
    fn eq(&self, other: &Self) -> bool {
        (0..self.dense.len().max(other.dense.len()))
            .chain(self.sparse.keys().copied())
            .chain(other.sparse.keys().copied())
            .all(|pos| self.read(pos) == other.read(pos))
    }
}
impl Eq for Memory {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_reads_zero() {
        let mem = Memory::new(&[1, 2, 3]);
        assert_eq!(mem.read(0), 1);
        assert_eq!(mem.read(3), 0);
        assert_eq!(mem.read(1_000_000_000), 0);
    }

    #[test]
    fn grows_on_write() {
        let mut mem = Memory::new(&[1, 2, 3]);
        mem.write(6, 7);
        assert_eq!(mem.as_slice(), &[1, 2, 3, 0, 0, 0, 7]);
        mem.write(1, -2);
        assert_eq!(mem.read(1), -2);
    }

    #[test]
    fn far_cells_are_sparse() {
        let mut mem = Memory::new(&[99]);
        mem.write(1 << 40, 5);
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.read(1 << 40), 5);
        assert_eq!(mem.read((1 << 40) + 1), 0);
    }

    #[test]
    fn program_longer_than_dense_limit() {
        let program = vec![1; DENSE_LIMIT + 10];
        let mut mem = Memory::new(&program);
        mem.write(DENSE_LIMIT + 5, 2);
        mem.write(DENSE_LIMIT + 12, 3);
        assert_eq!(mem.len(), DENSE_LIMIT + 10);
        assert_eq!(mem.read(DENSE_LIMIT + 5), 2);
        assert_eq!(mem.read(DENSE_LIMIT + 11), 0);
        assert_eq!(mem.read(DENSE_LIMIT + 12), 3);
    }

    #[test]
    fn equality_ignores_the_storage() {
        assert_eq!(Memory::new(&[1, 2]), Memory::new(&[1, 2, 0, 0]));

        let mut zeroed = Memory::new(&[1, 2]);
        zeroed.write(1 << 40, 0);
        assert_eq!(zeroed, Memory::new(&[1, 2]));

        // the same far cell, once in the buffer and once in the map
        let mut dense = Memory::new(&vec![0; DENSE_LIMIT + 2]);
        dense.write(DENSE_LIMIT + 1, 4);
        let mut sparse = Memory::new(&[0]);
        sparse.write(DENSE_LIMIT + 1, 4);
        assert_eq!(dense, sparse);

        sparse.write(DENSE_LIMIT + 1, 5);
        assert_ne!(dense, sparse);
        assert_ne!(Memory::new(&[1, 2]), Memory::new(&[1, 2, 3]));
    }
}
