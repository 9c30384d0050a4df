//! the open handle table
//!
//! A handle ([Fd]) packs a slot index (low 16 bits) and the generation of
//! that slot (bits 16..31). Closing a handle bumps the generation of its
//! slot, so a handle kept after `close` never reaches whatever is opened
//! in the same slot later.
use super::{FsError, FsResult, InodeId};

const SLOT_BITS: u32 = 16;
const MAX_SLOTS: usize = 1 << SLOT_BITS;
/// keeps every encoded handle non-negative
const GENERATION_MASK: u16 = 0x7fff;

/// a handle returned by `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(i32);

impl Fd {
    fn new(slot: usize, generation: u16) -> Self {
        Fd(((generation as i32) << SLOT_BITS) | slot as i32)
    }

    pub const fn from_raw(raw: i32) -> Self {
        Fd(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    fn slot(self) -> usize {
        (self.0 as u32 & (MAX_SLOTS as u32 - 1)) as usize
    }

    fn generation(self) -> u16 {
        (self.0 as u32 >> SLOT_BITS) as u16
    }
}

impl std::fmt::Display for Fd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// what an open handle is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: InodeId,
    /// byte offset of the next read or write
    pub cursor: u64,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u16,
    open: Option<OpenFile>,
}

#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Slot>,
}

impl HandleTable {
    /// bind a new handle to `inode` with its cursor at zero
    pub fn open(&mut self, inode: InodeId) -> FsResult<Fd> {
        let file = OpenFile { inode, cursor: 0 };
        let slot = match self.slots.iter().position(|s| s.open.is_none()) {
            Some(slot) => slot,
            None if self.slots.len() < MAX_SLOTS => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
            None => {
                return Err(FsError::InvalidArgument(format!(
                    "all {MAX_SLOTS} handles are open"
                )))
            }
        };
        self.slots[slot].open = Some(file);
        Ok(Fd::new(slot, self.slots[slot].generation))
    }

    pub fn close(&mut self, fd: Fd) -> FsResult<OpenFile> {
        self.get(fd)?;
        let slot = &mut self.slots[fd.slot()];
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        slot.open.take().ok_or(FsError::BadFd(fd.as_raw()))
    }

    pub fn get(&self, fd: Fd) -> FsResult<&OpenFile> {
        if fd.as_raw() < 0 {
            return Err(FsError::BadFd(fd.as_raw()));
        }
        self.slots
            .get(fd.slot())
            .filter(|slot| slot.generation == fd.generation())
            .and_then(|slot| slot.open.as_ref())
            .ok_or(FsError::BadFd(fd.as_raw()))
    }

    pub fn get_mut(&mut self, fd: Fd) -> FsResult<&mut OpenFile> {
        self.get(fd)?;
        self.slots[fd.slot()]
            .open
            .as_mut()
            .ok_or(FsError::BadFd(fd.as_raw()))
    }

    /// close every handle bound to `inode`, returns how many were closed
    pub fn invalidate_inode(&mut self, inode: InodeId) -> usize {
        let mut closed = 0;
        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.open.is_some_and(|file| file.inode == inode))
        {
            slot.open = None;
            slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
            closed += 1;
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_handles() {
        let mut table = HandleTable::default();
        let a = table.open(3).unwrap();
        let b = table.open(3).unwrap();
        assert_ne!(a, b);
        table.get_mut(a).unwrap().cursor = 100;
        assert_eq!(table.get(b).unwrap().cursor, 0);
    }

    #[test]
    fn test_closed_handle_is_bad() {
        let mut table = HandleTable::default();
        let a = table.open(1).unwrap();
        assert_eq!(table.close(a).unwrap().inode, 1);
        assert!(matches!(table.get(a), Err(FsError::BadFd(_))));
        assert!(matches!(table.close(a), Err(FsError::BadFd(_))));
    }

    #[test]
    fn test_stale_handle_does_not_reach_reused_slot() {
        let mut table = HandleTable::default();
        let old = table.open(1).unwrap();
        table.close(old).unwrap();
        let new = table.open(2).unwrap();
        // same slot, different generation
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert!(table.get(old).is_err());
        assert_eq!(table.get(new).unwrap().inode, 2);
    }

    #[test]
    fn test_unknown_and_negative_handles() {
        let table = HandleTable::default();
        assert!(table.get(Fd::from_raw(-1)).is_err());
        assert!(table.get(Fd::from_raw(0)).is_err());
        assert!(table.get(Fd::from_raw(12345)).is_err());
    }

    #[test]
    fn test_invalidate_inode() {
        let mut table = HandleTable::default();
        let a = table.open(4).unwrap();
        let b = table.open(5).unwrap();
        let c = table.open(4).unwrap();
        assert_eq!(table.invalidate_inode(4), 2);
        assert!(table.get(a).is_err());
        assert!(table.get(c).is_err());
        assert!(table.get(b).is_ok());
    }

    #[test]
    fn test_handles_stay_non_negative() {
        let mut table = HandleTable::default();
        for _ in 0..(GENERATION_MASK as usize + 5) {
            let fd = table.open(0).unwrap();
            assert!(fd.as_raw() >= 0);
            table.close(fd).unwrap();
        }
    }
}
