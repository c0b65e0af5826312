//! The stop-the-world mark-sweep cycle.
//!
//! A collection runs four phases under the caller's lock:
//!
//! 1. **Prep**: suspend the world, drop the lookup caches, zero the
//!    per-pool mark/scan/free bitmaps, re-derive the free bits from the
//!    free lists and pre-mark free-listed slots so they are never treated
//!    as roots.
//! 2. **Mark**: conservatively scan roots, registered ranges and thread
//!    stacks word-by-word. Marking recurses into object bodies up to
//!    [`MAX_MARK_RECURSIONS`] levels deep; anything deeper is parked in
//!    the owning pool's scan bitmap and drained by the multi-pass
//!    worklist loop.
//! 3. **Sweep**: after the mark state has been offered to the host via
//!    `process_marks` and the world resumed, return dead large-block
//!    runs to the free state and flag dead small slots free, running
//!    finalizers and batching attribute clears per bitmap word.
//! 4. **Recover**: rebuild every free list from the free bits, demoting
//!    pages whose slots are all free.

use crate::bits::{GcBits, BITS_PER_WORD};
use crate::heap::pool::{Pool, SHIFT_SMALL};
use crate::heap::pool_table::PoolTable;
use crate::heap::size_class::{Bin, SMALL_BIN_COUNT};
use crate::heap::{FreeNode, Heap};
use crate::hooks::{FinalizeFn, ThreadHooks};
use crate::roots::RootSet;
use crate::{attr, PAGE_SIZE};

/// Mark recursion bound; deeper chains defer to the scan-bit worklist.
pub(crate) const MAX_MARK_RECURSIONS: u32 = 64;

/// Result of one collection cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectResult {
    /// Large-block pages returned to the free state by the sweep.
    pub pages_freed: usize,
    /// Small-bin pages recovered whole after the sweep.
    pub pages_recovered: usize,
    /// Bytes reclaimed, counting small slots and freed pages.
    pub bytes_freed: usize,
}

impl CollectResult {
    /// Combined page yield; the retry ladders compare this against a
    /// fraction of the heap to decide between collecting and growing.
    #[inline]
    pub fn page_yield(&self) -> usize {
        self.pages_freed + self.pages_recovered
    }
}

/// Run a full collection. The caller holds the global lock and has
/// already rejected reentrant entry.
pub(crate) fn full_collect(
    heap: &mut Heap,
    roots: &RootSet,
    hooks: &mut dyn ThreadHooks,
    finalizer: Option<FinalizeFn>,
    scan_stacks: bool,
) -> CollectResult {
    hooks.suspend_all();

    prepare(heap);

    {
        let mut marker = Marker {
            pools: &mut heap.pools,
        };
        for &root in roots.roots() {
            marker.mark_one(root as usize);
        }
        for range in roots.ranges() {
            // SAFETY: registered ranges are readable by contract.
            unsafe { marker.mark(range.pbot, range.ptop, 0) };
        }
        if scan_stacks {
            hooks.scan_all(&mut |pbot, ptop| {
                // SAFETY: the hook reports suspended threads' live
                // register+stack windows.
                unsafe { marker.mark(pbot, ptop, 0) };
            });
        }
        marker.drain_scan();
    }

    hooks.process_marks(&mut |addr| heap.mark_status(addr as usize));
    hooks.resume_all();

    let mut result = CollectResult::default();
    sweep(heap, finalizer, &mut result);
    recover(heap, &mut result);
    result
}

/// Reset per-cycle bitmaps and re-derive the free bits from the free
/// lists, pre-marking free slots.
fn prepare(heap: &mut Heap) {
    heap.invalidate_caches();

    let (pools, buckets) = heap.split();
    for pool in pools.iter_mut() {
        pool.reset_collect_state();
    }
    for &head in buckets.iter() {
        let mut node = head;
        while !node.is_null() {
            let addr = node as usize;
            let pi = pools.find(addr).expect("free-list entry outside any pool");
            let pool = pools.get_mut(pi);
            let biti = pool.biti_of(addr - pool.base_addr());
            pool.set_free_slot(biti);
            // SAFETY: bucket links point at free slots the heap owns.
            node = unsafe { (*node).next };
        }
    }
    for pool in pools.iter_mut() {
        if !pool.is_large() {
            pool.seed_marks_from_free();
        }
    }
}

// =============================================================================
// Marking
// =============================================================================

/// Conservative marker over the pool table.
struct Marker<'a> {
    pools: &'a mut PoolTable,
}

impl Marker<'_> {
    /// Mark a single candidate pointer value (a root).
    fn mark_one(&mut self, addr: usize) {
        let mut pcache = 0usize;
        self.mark_candidate(addr, &mut pcache, 0);
    }

    /// Scan `[pbot, ptop)` as an array of word-aligned candidate
    /// pointers.
    ///
    /// # Safety
    ///
    /// The range must be readable for the duration of the call.
    unsafe fn mark(&mut self, pbot: *mut u8, ptop: *mut u8, depth: u32) {
        const WORD: usize = std::mem::size_of::<usize>();
        let mut p = (pbot as usize).next_multiple_of(WORD);
        let top = (ptop as usize) & !(WORD - 1);
        let mut pcache = 0usize;
        while p < top {
            // SAFETY: p stays word-aligned inside the caller's range.
            let value = unsafe { *(p as *const usize) };
            self.mark_candidate(value, &mut pcache, depth);
            p += WORD;
        }
    }

    fn mark_candidate(&mut self, addr: usize, pcache: &mut usize, depth: u32) {
        if addr < self.pools.min_addr() || addr >= self.pools.max_addr() {
            return;
        }
        if addr & !(PAGE_SIZE - 1) == *pcache {
            return;
        }
        let Some(pi) = self.pools.find(addr) else {
            return;
        };

        let (lo, hi) = {
            let pool = self.pools.get_mut(pi);
            let offset = addr - pool.base_addr();
            if !pool.bin_at(offset / PAGE_SIZE).is_small() {
                // A large block (or free run) owns this whole page; any
                // further hit on it resolves identically.
                *pcache = addr & !(PAGE_SIZE - 1);
            }
            let Some((_, biti, points_to_base)) = pool.resolve_base(offset) else {
                return;
            };
            if !points_to_base && pool.test_no_interior(biti) {
                return;
            }
            if pool.mark_bits.test_set(biti) {
                return;
            }
            if pool.test_no_scan(biti) {
                return;
            }
            if depth >= MAX_MARK_RECURSIONS {
                pool.scan_bits.set(biti);
                pool.new_changes = true;
                return;
            }
            pool.object_span(biti)
        };
        // SAFETY: the span covers one live object inside a mapped pool.
        unsafe { self.mark(lo as *mut u8, hi as *mut u8, depth + 1) };
    }

    /// Drain the deferred-scan bitmaps to a fixpoint.
    ///
    /// Each pass snapshots the per-pool change flags, then walks flagged
    /// pools' scan bitmaps word-by-word, bit-scan-forward over each
    /// non-zero word. Scanning an object may set scan bits anywhere, so
    /// passes repeat until no pool reports changes.
    fn drain_scan(&mut self) {
        loop {
            let mut any = false;
            for pi in 0..self.pools.len() {
                let pool = self.pools.get_mut(pi);
                pool.old_changes = pool.new_changes;
                pool.new_changes = false;
                any |= pool.old_changes;
            }
            if !any {
                break;
            }

            for pi in 0..self.pools.len() {
                if !self.pools.get(pi).old_changes {
                    continue;
                }
                let nwords = self.pools.get(pi).scan_bits.nwords();
                for w in 1..=nwords {
                    let word = {
                        let pool = self.pools.get_mut(pi);
                        let word = pool.scan_bits.word(w);
                        if word != 0 {
                            pool.scan_bits.set_word(w, 0);
                        }
                        word
                    };
                    if word == 0 {
                        continue;
                    }
                    let mut bits = word;
                    while bits != 0 {
                        let biti = (w - 1) * BITS_PER_WORD + bits.trailing_zeros() as usize;
                        bits &= bits - 1;
                        let (lo, hi) = self.pools.get(pi).object_span(biti);
                        // SAFETY: span of a marked object in a mapped pool.
                        unsafe { self.mark(lo as *mut u8, hi as *mut u8, 0) };
                    }
                }
            }
        }
    }
}

// =============================================================================
// Sweep
// =============================================================================

fn sweep(heap: &mut Heap, finalizer: Option<FinalizeFn>, result: &mut CollectResult) {
    for pi in 0..heap.pools.len() {
        if heap.pools.get(pi).is_large() {
            sweep_large_pool(heap.pools.get_mut(pi), finalizer, result);
        } else {
            sweep_small_pool(heap.pools.get_mut(pi), finalizer, result);
        }
    }
}

/// Sweep one large pool: return every unmarked block's page run to the
/// free state.
fn sweep_large_pool(pool: &mut Pool, finalizer: Option<FinalizeFn>, result: &mut CollectResult) {
    let mut pn = 0;
    while pn < pool.npages() {
        match pool.bin_at(pn) {
            Bin::Page => {
                let n = pool.run_length(pn);
                if pool.mark_bits.test(pn) {
                    pn += n;
                    continue;
                }
                let base = (pool.base_addr() + pn * PAGE_SIZE) as *mut u8;
                if pool.test_finals(pn) {
                    if let Some(finalize) = finalizer {
                        // SAFETY: base is the dead block's base.
                        unsafe { finalize(base, false, false) };
                    }
                }
                pool.clr_attrs(pn, attr::ALL);
                pool.free_pages(pn, n);
                result.pages_freed += n;
                result.bytes_freed += n * PAGE_SIZE;
                pn += n;
            }
            _ => pn += 1,
        }
    }
}

/// Sweep one small pool: flag dead slots free and clear their attribute
/// bits one bitmap word at a time.
fn sweep_small_pool(pool: &mut Pool, finalizer: Option<FinalizeFn>, result: &mut CollectResult) {
    let bits_per_page = PAGE_SIZE >> SHIFT_SMALL;
    for pn in 0..pool.npages() {
        let bin = pool.bin_at(pn);
        if !bin.is_small() {
            continue;
        }
        let size = bin.size();
        let stride = size >> SHIFT_SMALL;
        let bit_base = pn * bits_per_page;
        let bit_top = bit_base + bits_per_page;

        let mut clear_word = 0usize;
        let mut to_clear = 0usize;
        let mut biti = bit_base;
        while biti < bit_top {
            if !pool.mark_bits.test(biti) {
                if pool.test_finals(biti) {
                    if let Some(finalize) = finalizer {
                        let p = (pool.base_addr() + (biti << SHIFT_SMALL)) as *mut u8;
                        // SAFETY: p is the dead slot's base.
                        unsafe { finalize(p, false, false) };
                    }
                }
                pool.set_free_slot(biti);
                result.bytes_freed += size;

                let w = GcBits::word_of(biti);
                if w != clear_word {
                    if to_clear != 0 {
                        pool.clr_attrs_word(clear_word, to_clear);
                    }
                    clear_word = w;
                    to_clear = 0;
                }
                to_clear |= GcBits::mask_of(biti);
            }
            biti += stride;
        }
        if to_clear != 0 {
            pool.clr_attrs_word(clear_word, to_clear);
        }
    }
}

// =============================================================================
// Recovery
// =============================================================================

/// Rebuild every free list from the free bits and demote pages whose
/// slots are all free.
fn recover(heap: &mut Heap, result: &mut CollectResult) {
    let (pools, buckets) = heap.split();
    *buckets = [std::ptr::null_mut(); SMALL_BIN_COUNT];

    let bits_per_page = PAGE_SIZE >> SHIFT_SMALL;
    for pi in 0..pools.len() {
        let pool = pools.get_mut(pi);
        if pool.is_large() {
            continue;
        }
        for pn in 0..pool.npages() {
            let bin = pool.bin_at(pn);
            if !bin.is_small() {
                continue;
            }
            let stride = bin.size() >> SHIFT_SMALL;
            let bit_base = pn * bits_per_page;
            let bit_top = bit_base + bits_per_page;

            let mut all_free = true;
            let mut biti = bit_base;
            while biti < bit_top {
                if !pool.is_free_slot(biti) {
                    all_free = false;
                    break;
                }
                biti += stride;
            }
            if all_free {
                pool.free_pages(pn, 1);
                result.pages_recovered += 1;
                continue;
            }

            let bi = bin as usize;
            let mut biti = bit_base;
            while biti < bit_top {
                if pool.is_free_slot(biti) {
                    let node = (pool.base_addr() + (biti << SHIFT_SMALL)) as *mut FreeNode;
                    // SAFETY: the slot is free; its first word is the
                    // link. Skip the store when it is already right.
                    unsafe {
                        if (*node).next != buckets[bi] {
                            (*node).next = buckets[bi];
                        }
                    }
                    buckets[bi] = node;
                }
                biti += stride;
            }
        }
    }
}
