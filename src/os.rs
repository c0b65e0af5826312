//! Page-granular memory mapping.
//!
//! Pools are mapped and unmapped as whole page-aligned regions. The
//! system allocator with an explicit page-aligned layout stands in for a
//! raw `mmap`/`munmap` pair, which keeps the collector portable.

use crate::PAGE_SIZE;
use std::alloc::Layout;
use std::ptr::NonNull;

/// Map `nbytes` of zeroed, page-aligned memory.
///
/// `nbytes` must be a non-zero multiple of [`PAGE_SIZE`]. Returns `None`
/// when the system is out of memory.
pub(crate) fn map(nbytes: usize) -> Option<NonNull<u8>> {
    debug_assert!(nbytes > 0 && nbytes % PAGE_SIZE == 0);

    let layout = Layout::from_size_align(nbytes, PAGE_SIZE).ok()?;
    // SAFETY: layout has non-zero size.
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    NonNull::new(ptr)
}

/// Unmap a region previously returned by [`map`] with the same `nbytes`.
///
/// # Safety
///
/// `base` must come from [`map`] with exactly this `nbytes`, and must not
/// be used afterwards.
pub(crate) unsafe fn unmap(base: NonNull<u8>, nbytes: usize) {
    debug_assert!(nbytes > 0 && nbytes % PAGE_SIZE == 0);

    if let Ok(layout) = Layout::from_size_align(nbytes, PAGE_SIZE) {
        unsafe {
            std::alloc::dealloc(base.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_is_page_aligned() {
        let p = map(4 * PAGE_SIZE).expect("map failed");
        assert_eq!(p.as_ptr() as usize % PAGE_SIZE, 0);
        unsafe { unmap(p, 4 * PAGE_SIZE) };
    }

    #[test]
    fn test_map_is_zeroed() {
        let p = map(PAGE_SIZE).expect("map failed");
        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { unmap(p, PAGE_SIZE) };
    }
}
