//! Heap: pool ownership and allocation mechanics.
//!
//! The heap owns the pool table and the per-bin free lists and provides
//! the collection-free allocation primitives. When a primitive fails the
//! caller decides whether to collect or grow; that policy (the retry
//! ladders) lives with the public API, the way a space here only reports
//! exhaustion upward.

pub(crate) mod pool;
pub(crate) mod pool_table;
pub(crate) mod size_class;

use crate::config::GcConfig;
use crate::hooks::MarkStatus;
use crate::stats::HeapStats;
use crate::{attr, BlkInfo, PAGE_SIZE};
use rustc_hash::FxHashSet;
use self::pool::Pool;
use self::pool_table::PoolTable;
use self::size_class::{Bin, BIN_SIZES, SMALL_BIN_COUNT};
use std::ptr::NonNull;

/// Intrusive free-list link, stored in the free slot itself.
pub(crate) struct FreeNode {
    pub(crate) next: *mut FreeNode,
}

/// Round a byte count up to whole pages.
#[inline]
pub(crate) fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}

/// The heap: pool table, free-list buckets, and lookup caches.
pub(crate) struct Heap {
    pub(crate) pools: PoolTable,
    /// Free-list heads, one per small bin.
    pub(crate) buckets: [*mut FreeNode; SMALL_BIN_COUNT],
    /// One-entry cache for repeated `find_size` probes of one pointer.
    size_cache: Option<(usize, usize)>,
    /// One-entry cache for repeated `get_info` probes of one pointer.
    info_cache: Option<(usize, BlkInfo)>,
    pub(crate) config: GcConfig,
}

impl Heap {
    pub(crate) fn new(config: GcConfig) -> Self {
        Self {
            pools: PoolTable::new(),
            buckets: [std::ptr::null_mut(); SMALL_BIN_COUNT],
            size_cache: None,
            info_cache: None,
            config,
        }
    }

    /// Drop both lookup caches. Called on the collection prelude and on
    /// anything that changes a block's identity.
    pub(crate) fn invalidate_caches(&mut self) {
        self.size_cache = None;
        self.info_cache = None;
    }

    /// Borrow the pool table and the free-list heads together, for the
    /// collector phases that walk one while rewriting the other.
    pub(crate) fn split(&mut self) -> (&mut PoolTable, &mut [*mut FreeNode; SMALL_BIN_COUNT]) {
        (&mut self.pools, &mut self.buckets)
    }

    // =========================================================================
    // Allocation primitives (no collection)
    // =========================================================================

    /// Pop a slot from `bin`'s free list, promoting a free page into a
    /// fresh run first if the bucket is empty. `None` means the heap is
    /// exhausted for this bin and the caller should collect or grow.
    pub(crate) fn alloc_small_fast(&mut self, bin: Bin) -> Option<NonNull<u8>> {
        debug_assert!(bin.is_small());
        let bi = bin as usize;
        if self.buckets[bi].is_null() && !self.alloc_page(bin) {
            return None;
        }
        let head = self.buckets[bi];
        // SAFETY: bucket links always point at live free slots inside a
        // small pool.
        unsafe {
            self.buckets[bi] = (*head).next;
        }
        let addr = head as usize;
        let pi = self
            .pools
            .find(addr)
            .expect("free-list entry outside any pool");
        let pool = self.pools.get_mut(pi);
        let biti = pool.biti_of(addr - pool.base_addr());
        pool.clear_free_slot(biti);
        NonNull::new(head as *mut u8)
    }

    /// Convert one free page of some small pool into a run of `bin`-sized
    /// free slots threaded onto the bucket.
    fn alloc_page(&mut self, bin: Bin) -> bool {
        debug_assert!(self.buckets[bin as usize].is_null());
        for pi in 0..self.pools.len() {
            let pool = self.pools.get_mut(pi);
            if pool.is_large() || pool.freepages == 0 {
                continue;
            }
            let pn = match pool.alloc_pages(1) {
                Some(pn) => pn,
                None => continue,
            };
            pool.set_bin(pn, bin);

            let size = bin.size();
            let nslots = PAGE_SIZE / size;
            let stride = size >> pool::SHIFT_SMALL;
            let bit_base = pool.biti_of(pn * PAGE_SIZE);
            for i in 0..nslots {
                pool.set_free_slot(bit_base + i * stride);
            }

            let page_base = pool.base_addr() + pn * PAGE_SIZE;
            // SAFETY: the page was just claimed from the free state; the
            // links are written into memory this heap owns.
            unsafe {
                let mut p = page_base as *mut FreeNode;
                for i in 1..nslots {
                    let next = (page_base + i * size) as *mut FreeNode;
                    (*p).next = next;
                    p = next;
                }
                (*p).next = self.buckets[bin as usize];
                self.buckets[bin as usize] = page_base as *mut FreeNode;
            }
            return true;
        }
        false
    }

    /// Claim a run of `npages` pages from some large pool. `None` means
    /// no pool has room and the caller should collect or grow.
    pub(crate) fn alloc_big_fast(&mut self, npages: usize) -> Option<NonNull<u8>> {
        for pi in 0..self.pools.len() {
            let pool = self.pools.get_mut(pi);
            if !pool.is_large() || pool.freepages < npages {
                continue;
            }
            let pn = match pool.alloc_pages(npages) {
                Some(pn) => pn,
                None => continue,
            };
            pool.set_bin(pn, Bin::Page);
            for k in pn + 1..pn + npages {
                pool.set_bin(k, Bin::PagePlus);
            }
            pool.update_offsets(pn);
            return NonNull::new((pool.base_addr() + pn * PAGE_SIZE) as *mut u8);
        }
        None
    }

    /// Map a new pool of at least `config.pool_pages` pages and add it to
    /// the table. Returns the mapped byte count.
    pub(crate) fn new_pool(&mut self, npages: usize, is_large: bool) -> Option<usize> {
        let npages = npages.max(self.config.pool_pages);
        let pool = Pool::new(npages, is_large)?;
        self.pools.insert(pool);
        Some(npages * PAGE_SIZE)
    }

    /// Release every fully free pool back to the OS. Returns how many
    /// pools were unmapped.
    pub(crate) fn minimize(&mut self) -> usize {
        self.invalidate_caches();
        self.pools.release_empty()
    }

    // =========================================================================
    // Free
    // =========================================================================

    /// Return a block to the heap. Foreign pointers, interior pointers,
    /// continuation pages and already-free slots are silently ignored.
    pub(crate) fn free(&mut self, p: *mut u8) {
        let addr = p as usize;
        let Some(pi) = self.pools.find(addr) else {
            return;
        };
        self.invalidate_caches();
        let pool = self.pools.get_mut(pi);
        let offset = addr - pool.base_addr();
        let pn = offset / PAGE_SIZE;
        match pool.bin_at(pn) {
            Bin::Page => {
                if offset % PAGE_SIZE != 0 {
                    return;
                }
                let n = pool.run_length(pn);
                pool.clr_attrs(pn, attr::ALL);
                pool.free_pages(pn, n);
            }
            bin if bin.is_small() => {
                if offset & (bin.size() - 1) != 0 {
                    return;
                }
                let biti = pool.biti_of(offset);
                if pool.is_free_slot(biti) {
                    return;
                }
                pool.clr_attrs(biti, attr::ALL);
                pool.set_free_slot(biti);
                let node = p as *mut FreeNode;
                // SAFETY: the slot is ours again; reuse it as the link.
                unsafe {
                    (*node).next = self.buckets[bin as usize];
                }
                self.buckets[bin as usize] = node;
            }
            _ => {} // Free or PagePlus
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Base address of the block containing `addr`, or 0. Free pages and
    /// free-listed slots report 0.
    pub(crate) fn find_base(&self, addr: usize) -> usize {
        let Some(pi) = self.pools.find(addr) else {
            return 0;
        };
        let pool = self.pools.get(pi);
        match pool.resolve_base(addr - pool.base_addr()) {
            Some((base, biti, _)) => {
                if !pool.is_large() && pool.is_free_slot(biti) {
                    0
                } else {
                    pool.base_addr() + base
                }
            }
            None => 0,
        }
    }

    /// Capacity of the block containing `addr`, or 0.
    pub(crate) fn find_size(&mut self, addr: usize) -> usize {
        if let Some((key, size)) = self.size_cache {
            if key == addr {
                return size;
            }
        }
        let size = self.find_size_uncached(addr);
        if size != 0 {
            self.size_cache = Some((addr, size));
        }
        size
    }

    fn find_size_uncached(&self, addr: usize) -> usize {
        let Some(pi) = self.pools.find(addr) else {
            return 0;
        };
        let pool = self.pools.get(pi);
        match pool.resolve_base(addr - pool.base_addr()) {
            Some((_, biti, _)) => {
                if !pool.is_large() && pool.is_free_slot(biti) {
                    0
                } else {
                    let (lo, hi) = pool.object_span(biti);
                    hi - lo
                }
            }
            None => 0,
        }
    }

    /// Full block description for `addr`; `BlkInfo::null()` for foreign
    /// pointers and free memory.
    pub(crate) fn get_info(&mut self, addr: usize) -> BlkInfo {
        if let Some((key, info)) = self.info_cache {
            if key == addr {
                return info;
            }
        }
        let Some(pi) = self.pools.find(addr) else {
            return BlkInfo::null();
        };
        let pool = self.pools.get(pi);
        let info = match pool.resolve_base(addr - pool.base_addr()) {
            Some((base, biti, _)) => {
                if !pool.is_large() && pool.is_free_slot(biti) {
                    BlkInfo::null()
                } else {
                    let (lo, hi) = pool.object_span(biti);
                    BlkInfo {
                        base: (pool.base_addr() + base) as *mut u8,
                        size: hi - lo,
                        attr: pool.get_attrs(biti),
                    }
                }
            }
            None => BlkInfo::null(),
        };
        if !info.base.is_null() {
            self.info_cache = Some((addr, info));
        }
        info
    }

    /// Reachability answer for the host's `process_marks` predicate.
    pub(crate) fn mark_status(&self, addr: usize) -> MarkStatus {
        let Some(pi) = self.pools.find(addr) else {
            return MarkStatus::Unknown;
        };
        let pool = self.pools.get(pi);
        match pool.resolve_base(addr - pool.base_addr()) {
            Some((_, biti, _)) => {
                if pool.mark_bits.test(biti) {
                    MarkStatus::Yes
                } else {
                    MarkStatus::No
                }
            }
            None => MarkStatus::No,
        }
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub(crate) fn get_attr(&self, addr: usize) -> u16 {
        match self.pools.find(addr) {
            Some(pi) => {
                let pool = self.pools.get(pi);
                pool.get_attrs(pool.biti_of(addr - pool.base_addr()))
            }
            None => 0,
        }
    }

    /// Set `mask` on the block's attribute bits, returning the previous
    /// mask.
    pub(crate) fn set_attr(&mut self, addr: usize, mask: u16) -> u16 {
        self.info_cache = None;
        match self.pools.find(addr) {
            Some(pi) => {
                let pool = self.pools.get_mut(pi);
                let biti = pool.biti_of(addr - pool.base_addr());
                let old = pool.get_attrs(biti);
                pool.set_attrs(biti, mask);
                old
            }
            None => 0,
        }
    }

    /// Clear `mask` from the block's attribute bits, returning the
    /// previous mask.
    pub(crate) fn clr_attr(&mut self, addr: usize, mask: u16) -> u16 {
        self.info_cache = None;
        match self.pools.find(addr) {
            Some(pi) => {
                let pool = self.pools.get_mut(pi);
                let biti = pool.biti_of(addr - pool.base_addr());
                let old = pool.get_attrs(biti);
                pool.clr_attrs(biti, mask);
                old
            }
            None => 0,
        }
    }

    // =========================================================================
    // In-place resizing of large blocks
    // =========================================================================

    /// Try to resize the large block at `addr` to `size` bytes without
    /// moving it: shrink by freeing trailing pages, or grow into trailing
    /// free pages. Returns the new capacity on success.
    pub(crate) fn resize_large_in_place(&mut self, addr: usize, size: usize) -> Option<usize> {
        let pi = self.pools.find(addr)?;
        let pool = self.pools.get_mut(pi);
        let offset = addr - pool.base_addr();
        if offset % PAGE_SIZE != 0 {
            return None;
        }
        let pn = offset / PAGE_SIZE;
        if pool.bin_at(pn) != Bin::Page {
            return None;
        }
        let psz = pool.run_length(pn);
        let newsz = pages_for(size);
        if newsz == psz {
            return Some(psz * PAGE_SIZE);
        }
        if newsz < psz {
            pool.shrink_block(pn, newsz);
        } else {
            if pn + newsz > pool.npages() {
                return None;
            }
            if (pn + psz..pn + newsz).any(|k| pool.bin_at(k) != Bin::Free) {
                return None;
            }
            pool.extend_block(pn, newsz - psz);
        }
        let capacity = newsz * PAGE_SIZE;
        self.update_size_caches(addr, capacity);
        Some(capacity)
    }

    /// Grow the large block at `addr` in place by at least `minsize` and
    /// at most `maxsize` bytes of trailing free pages. Returns the new
    /// total capacity, or 0 if fewer than `minsize` bytes are available.
    pub(crate) fn extend(&mut self, addr: usize, minsize: usize, maxsize: usize) -> usize {
        let Some(pi) = self.pools.find(addr) else {
            return 0;
        };
        let pool = self.pools.get_mut(pi);
        let offset = addr - pool.base_addr();
        let pn = offset / PAGE_SIZE;
        if pool.bin_at(pn) != Bin::Page {
            return 0;
        }
        let minsz = pages_for(minsize);
        let maxsz = pages_for(maxsize);
        let psz = pool.run_length(pn);

        let mut sz = 0;
        while sz < maxsz && pn + psz + sz < pool.npages() && pool.bin_at(pn + psz + sz) == Bin::Free
        {
            sz += 1;
        }
        if sz < minsz {
            return 0;
        }
        pool.extend_block(pn, sz);
        let capacity = (psz + sz) * PAGE_SIZE;
        self.update_size_caches(addr, capacity);
        capacity
    }

    /// Refresh the one-entry caches after an in-place capacity change.
    fn update_size_caches(&mut self, addr: usize, capacity: usize) {
        self.size_cache = Some((addr, capacity));
        let mut stale = false;
        if let Some((key, info)) = &mut self.info_cache {
            if info.base as usize == addr {
                info.size = capacity;
            } else if *key >= addr && *key < addr + capacity {
                stale = true;
            }
        }
        if stale {
            self.info_cache = None;
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Point-in-time occupancy snapshot.
    pub(crate) fn snapshot(&self) -> HeapStats {
        let mut stats = HeapStats {
            pool_count: self.pools.len(),
            ..Default::default()
        };
        let mut small_page_bytes = 0;
        for pool in self.pools.iter() {
            stats.pool_bytes += pool.npages() * PAGE_SIZE;
            stats.free_pages += pool.freepages;
            let used = pool.npages() - pool.freepages;
            if pool.is_large() {
                stats.large_pages += used;
            } else {
                small_page_bytes += used * PAGE_SIZE;
            }
        }
        for (bi, &head) in self.buckets.iter().enumerate() {
            let mut node = head;
            while !node.is_null() {
                stats.free_list_bytes += BIN_SIZES[bi];
                // SAFETY: bucket links point at free slots the heap owns.
                node = unsafe { (*node).next };
            }
        }
        stats.used_bytes = small_page_bytes.saturating_sub(stats.free_list_bytes);
        stats
    }

    /// Sanity-check a client pointer. Panics on corruption (wrong-bin
    /// free-list membership, misaligned slot pointer, pointer into a free
    /// or continuation page); null is a no-op.
    pub(crate) fn check(&self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let addr = p as usize;
        let pi = self.pools.find(addr).expect("pointer outside GC heap");
        let pool = self.pools.get(pi);
        let offset = addr - pool.base_addr();
        let pn = offset / PAGE_SIZE;
        let bin = pool.bin_at(pn);
        assert!(
            bin <= Bin::Page,
            "pointer {:p} into a free or continuation page",
            p
        );
        if bin.is_small() {
            let size = bin.size();
            assert!(
                offset & (size - 1) == 0,
                "pointer {:p} not at a bin-{} boundary",
                p,
                size
            );
            let mut node = self.buckets[bin as usize];
            while !node.is_null() {
                assert!(node as usize != addr, "pointer {:p} is on a free list", p);
                // SAFETY: bucket links point at free slots the heap owns.
                node = unsafe { (*node).next };
            }
        }
    }

    /// Full heap integrity pass; panics on any violated invariant.
    pub(crate) fn verify(&self) {
        // Pool table order and disjointness.
        for i in 1..self.pools.len() {
            let prev = self.pools.get(i - 1);
            let cur = self.pools.get(i);
            assert!(prev.base_addr() < cur.base_addr(), "pool table unsorted");
            assert!(prev.top_addr() <= cur.base_addr(), "pools overlap");
        }

        for pool in self.pools.iter() {
            let free_count = (0..pool.npages())
                .filter(|&pn| pool.bin_at(pn) == Bin::Free)
                .count();
            assert_eq!(free_count, pool.freepages, "freepages out of sync");
            for pn in 0..pool.search_start.min(pool.npages()) {
                assert!(
                    pool.bin_at(pn) != Bin::Free,
                    "free page below search_start"
                );
            }

            if pool.is_large() {
                let mut pn = 0;
                while pn < pool.npages() {
                    match pool.bin_at(pn) {
                        Bin::Free => pn += 1,
                        Bin::Page => {
                            let n = pool.run_length(pn);
                            assert!(n >= 1 && pn + n <= pool.npages(), "bad run length");
                            for k in 1..n {
                                assert_eq!(
                                    pool.bin_at(pn + k),
                                    Bin::PagePlus,
                                    "broken block run"
                                );
                                assert_eq!(pool.back_offset(pn + k), k, "bad back-offset");
                            }
                            pn += n;
                        }
                        other => panic!("unexpected bin {:?} in large pool", other),
                    }
                }
            } else {
                for pn in 0..pool.npages() {
                    let bin = pool.bin_at(pn);
                    assert!(
                        bin.is_small() || bin == Bin::Free,
                        "unexpected bin {:?} in small pool",
                        bin
                    );
                }
            }
        }

        // Free lists: links stay in pages of their own bin, slots are
        // aligned and flagged free, and every list terminates.
        let mut seen = FxHashSet::default();
        for (bi, &head) in self.buckets.iter().enumerate() {
            let mut node = head;
            while !node.is_null() {
                let addr = node as usize;
                assert!(seen.insert(addr), "free-list cycle at {:#x}", addr);
                let pi = self.pools.find(addr).expect("free-list entry outside heap");
                let pool = self.pools.get(pi);
                let offset = addr - pool.base_addr();
                let bin = pool.bin_at(offset / PAGE_SIZE);
                assert_eq!(bin as usize, bi, "free-list entry on wrong-bin page");
                assert!(offset & (bin.size() - 1) == 0, "misaligned free-list entry");
                assert!(
                    pool.is_free_slot(pool.biti_of(offset)),
                    "free-list entry without free bit"
                );
                // SAFETY: links verified to point into owned pools.
                node = unsafe { (*node).next };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_heap() -> Heap {
        Heap::new(GcConfig {
            pool_pages: 8,
            ..Default::default()
        })
    }

    #[test]
    fn test_small_alloc_and_reuse() {
        let mut heap = test_heap();
        assert!(heap.alloc_small_fast(Bin::B32).is_none());
        heap.new_pool(1, false).expect("new_pool failed");

        let p1 = heap.alloc_small_fast(Bin::B32).expect("alloc failed");
        let p2 = heap.alloc_small_fast(Bin::B32).expect("alloc failed");
        assert_ne!(p1, p2);
        assert_eq!(heap.find_size(p1.as_ptr() as usize), 32);

        heap.free(p1.as_ptr());
        assert_eq!(heap.find_size(p1.as_ptr() as usize), 0);
        let p3 = heap.alloc_small_fast(Bin::B32).expect("alloc failed");
        assert_eq!(p1, p3);
        heap.verify();
    }

    #[test]
    fn test_double_free_is_ignored() {
        let mut heap = test_heap();
        heap.new_pool(1, false).expect("new_pool failed");
        let p = heap.alloc_small_fast(Bin::B16).expect("alloc failed");
        heap.free(p.as_ptr());
        heap.free(p.as_ptr());
        heap.verify();
    }

    #[test]
    fn test_big_alloc_run() {
        let mut heap = test_heap();
        heap.new_pool(8, true).expect("new_pool failed");
        let p = heap.alloc_big_fast(3).expect("big alloc failed");
        let addr = p.as_ptr() as usize;
        assert_eq!(heap.find_size(addr), 3 * PAGE_SIZE);
        // Interior pointers resolve to the same block, even across pages.
        assert_eq!(heap.find_base(addr + PAGE_SIZE + 100), addr);
        assert_eq!(heap.find_base(addr + 2 * PAGE_SIZE), addr);
        heap.free(p.as_ptr());
        assert_eq!(heap.find_size(addr), 0);
        heap.verify();
    }

    #[test]
    fn test_interior_free_is_ignored() {
        let mut heap = test_heap();
        heap.new_pool(8, true).expect("new_pool failed");
        let p = heap.alloc_big_fast(2).expect("big alloc failed");
        let addr = p.as_ptr() as usize;
        heap.free((addr + 16) as *mut u8);
        heap.free((addr + PAGE_SIZE) as *mut u8);
        assert_eq!(heap.find_size(addr), 2 * PAGE_SIZE);
        heap.verify();
    }

    #[test]
    fn test_extend_claims_trailing_pages() {
        let mut heap = test_heap();
        heap.new_pool(8, true).expect("new_pool failed");
        let p = heap.alloc_big_fast(3).expect("big alloc failed");
        let addr = p.as_ptr() as usize;

        let newcap = heap.extend(addr, 1, 4 * PAGE_SIZE);
        assert_eq!(newcap, 7 * PAGE_SIZE);
        assert_eq!(heap.find_size(addr), 7 * PAGE_SIZE);
        assert_eq!(heap.find_base(addr + 6 * PAGE_SIZE + 8), addr);
        heap.verify();

        // Only one page left; a demand for two must leave state alone.
        assert_eq!(heap.extend(addr, 2 * PAGE_SIZE, 2 * PAGE_SIZE), 0);
        assert_eq!(heap.find_size(addr), 7 * PAGE_SIZE);
        let more = heap.extend(addr, 1, PAGE_SIZE);
        assert_eq!(more, 8 * PAGE_SIZE);
        heap.verify();
    }

    #[test]
    fn test_resize_large_in_place() {
        let mut heap = test_heap();
        heap.new_pool(8, true).expect("new_pool failed");
        let p = heap.alloc_big_fast(5).expect("big alloc failed");
        let addr = p.as_ptr() as usize;

        // Shrink frees the trailing pages.
        let cap = heap
            .resize_large_in_place(addr, 2 * PAGE_SIZE)
            .expect("shrink failed");
        assert_eq!(cap, 2 * PAGE_SIZE);
        assert_eq!(heap.find_size(addr), 2 * PAGE_SIZE);
        heap.verify();

        // Grow back into the now-free pages.
        let cap = heap
            .resize_large_in_place(addr, 4 * PAGE_SIZE)
            .expect("grow failed");
        assert_eq!(cap, 4 * PAGE_SIZE);
        assert_eq!(heap.find_base(addr + 3 * PAGE_SIZE), addr);
        heap.verify();
    }

    #[test]
    fn test_attr_roundtrip() {
        let mut heap = test_heap();
        heap.new_pool(1, false).expect("new_pool failed");
        let p = heap.alloc_small_fast(Bin::B64).expect("alloc failed");
        let addr = p.as_ptr() as usize;

        assert_eq!(heap.set_attr(addr, attr::FINALIZE | attr::NO_SCAN), 0);
        assert_eq!(heap.get_attr(addr), attr::FINALIZE | attr::NO_SCAN);
        assert_eq!(
            heap.clr_attr(addr, attr::FINALIZE),
            attr::FINALIZE | attr::NO_SCAN
        );
        assert_eq!(heap.get_attr(addr), attr::NO_SCAN);

        // Free clears what is left.
        heap.free(p.as_ptr());
        let q = heap.alloc_small_fast(Bin::B64).expect("alloc failed");
        assert_eq!(q.as_ptr() as usize, addr);
        assert_eq!(heap.get_attr(addr), 0);
    }

    #[test]
    fn test_size_cache_tracks_changes() {
        let mut heap = test_heap();
        heap.new_pool(8, true).expect("new_pool failed");
        let p = heap.alloc_big_fast(2).expect("big alloc failed");
        let addr = p.as_ptr() as usize;

        assert_eq!(heap.find_size(addr), 2 * PAGE_SIZE);
        let cap = heap.extend(addr, 1, PAGE_SIZE);
        assert_eq!(cap, 3 * PAGE_SIZE);
        // Cached probe must see the new capacity.
        assert_eq!(heap.find_size(addr), 3 * PAGE_SIZE);
    }

    #[test]
    fn test_snapshot_accounting() {
        let mut heap = test_heap();
        heap.new_pool(8, false).expect("new_pool failed");
        heap.new_pool(8, true).expect("new_pool failed");
        let _small = heap.alloc_small_fast(Bin::B16).expect("alloc failed");
        let _big = heap.alloc_big_fast(3).expect("alloc failed");

        let stats = heap.snapshot();
        assert_eq!(stats.pool_count, 2);
        assert_eq!(stats.pool_bytes, 16 * PAGE_SIZE);
        assert_eq!(stats.large_pages, 3);
        assert_eq!(stats.free_pages, 7 + 5);
        // One page of 16-byte slots, one taken.
        assert_eq!(stats.free_list_bytes, PAGE_SIZE - 16);
        assert_eq!(stats.used_bytes, 16);
    }
}
