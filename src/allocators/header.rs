//! Block header layout.
//!
//! Every region handed out by a pool or by the fallback heap starts with a
//! [`BlockHeader`]. The user pointer sits `header_size` bytes after the start
//! of the region, where `header_size` is the header rounded up to the
//! configured alignment, so the header can be recovered from a bare pointer
//! with one subtraction.
//!
//! ```text
//! region base                     user pointer
//! |                               |
//! v                               v
//! +-------------------------------+---------------------------+
//! | BlockHeader | pad to align    | payload (logical_size)    |
//! +-------------------------------+---------------------------+
//! ```
//!
//! All unsafe pointer arithmetic on user pointers lives in this file.

use std::alloc::Layout;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::allocators::pool::SizeClassPool;
use crate::util::layout::{align_up, is_aligned};

/// `size_class` value recorded in fallback (oversized) headers.
pub(crate) const FALLBACK_CLASS: usize = 0;

/// Metadata stored immediately before every user pointer.
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Bytes usable by the caller.
    logical_size: usize,

    /// Block size of the owning pool, or [`FALLBACK_CLASS`].
    size_class: usize,

    /// Liveness flag; only flips `false -> true` on lease and `true -> false`
    /// on release.
    in_use: AtomicBool,

    /// Identity of the owning pool, null for fallback blocks. Compared, never
    /// dereferenced.
    owner: *const SizeClassPool,
}

impl BlockHeader {
    /// Bytes usable by the caller.
    #[inline]
    pub fn logical_size(&self) -> usize {
        self.logical_size
    }

    /// Recorded size class.
    #[inline]
    pub fn size_class(&self) -> usize {
        self.size_class
    }

    /// Recorded owning pool.
    #[inline]
    pub fn owner(&self) -> *const SizeClassPool {
        self.owner
    }

    /// Whether the block is currently leased to a caller.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Mark a block taken from a free list or cache as leased.
    #[inline]
    pub fn mark_leased(&self) {
        self.in_use.store(true, Ordering::Release);
    }

    /// Flip `in_use` from true to false.
    ///
    /// Returns false if the block was not live, i.e. this is a repeated
    /// release. Two racing releases of the same block cannot both succeed.
    #[inline]
    pub fn try_mark_released(&self) -> bool {
        self.in_use
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Header geometry for one allocator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderLayout {
    /// Header size rounded up to the alignment.
    header_size: usize,

    /// Alignment of whole regions.
    region_align: usize,
}

impl HeaderLayout {
    /// Build the layout for a power-of-two `alignment`.
    pub fn new(alignment: usize) -> Self {
        debug_assert!(alignment.is_power_of_two());
        Self {
            header_size: align_up(mem::size_of::<BlockHeader>(), alignment),
            region_align: alignment.max(mem::align_of::<BlockHeader>()),
        }
    }

    /// Bytes between the start of a region and its user pointer.
    #[cfg(test)]
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Layout of a region carrying `payload` usable bytes.
    ///
    /// `None` if the total size overflows.
    pub fn region_layout(&self, payload: usize) -> Option<Layout> {
        let total = self.header_size.checked_add(payload)?;
        Layout::from_size_align(total, self.region_align).ok()
    }

    /// Write a fresh, live header at `base` and return the user pointer.
    ///
    /// # Safety
    ///
    /// `base` must point to a writable region allocated with
    /// `self.region_layout(logical_size)` or larger.
    pub unsafe fn init(
        &self,
        base: NonNull<u8>,
        logical_size: usize,
        size_class: usize,
        owner: *const SizeClassPool,
    ) -> NonNull<u8> {
        debug_assert!(is_aligned(base.as_ptr() as usize, self.region_align));
        ptr::write(
            base.as_ptr().cast::<BlockHeader>(),
            BlockHeader {
                logical_size,
                size_class,
                in_use: AtomicBool::new(true),
                owner,
            },
        );
        NonNull::new_unchecked(base.as_ptr().add(self.header_size))
    }

    /// Recover the header of a user pointer.
    ///
    /// # Safety
    ///
    /// `user` must have been returned by [`HeaderLayout::init`] with an
    /// identical layout, and its region must still be allocated.
    #[inline]
    pub unsafe fn header<'a>(&self, user: NonNull<u8>) -> &'a BlockHeader {
        &*self.base_of(user).as_ptr().cast::<BlockHeader>()
    }

    /// Recover the region base of a user pointer.
    ///
    /// # Safety
    ///
    /// Same contract as [`HeaderLayout::header`].
    #[inline]
    pub unsafe fn base_of(&self, user: NonNull<u8>) -> NonNull<u8> {
        NonNull::new_unchecked(user.as_ptr().sub(self.header_size))
    }
}
