//! Public collector interface.
//!
//! A [`Gc`] owns the whole heap. Every entry point serializes on one
//! mutex; the allocation paths add the retry ladder that decides between
//! collecting, growing the pool table, and reporting out-of-memory.

use crate::collector::{self, CollectResult};
use crate::config::GcConfig;
use crate::heap::size_class::Bin;
use crate::heap::{pages_for, Heap};
use crate::hooks::{FinalizeFn, NoopThreadHooks, ThreadHooks};
use crate::roots::RootSet;
use crate::stats::{CollectTimer, GcStats, HeapStats};
use crate::{attr, BlkInfo, GcError, PAGE_SIZE};
use parking_lot::Mutex;
use std::cell::Cell;
use std::ptr::NonNull;

thread_local! {
    /// Set while this thread runs a collection. Trips the reentrancy gate
    /// when a finalizer calls back into a mutating entry point; checked
    /// before the lock so the failure is an error, not a deadlock.
    static IN_COLLECT: Cell<bool> = const { Cell::new(false) };
}

/// State behind the global lock.
struct GcInner {
    heap: Heap,
    roots: RootSet,
    hooks: Box<dyn ThreadHooks>,
    finalizer: Option<FinalizeFn>,
    /// Nesting count of `disable` calls; blocks ladder-driven collection.
    disabled: u32,
    /// Nesting count of no-stack collections in flight.
    no_stack: u32,
}

/// A conservative stop-the-world mark-and-sweep garbage collector.
///
/// All operations are serialized by an internal lock; the type is safe to
/// share across threads, though collection only observes other threads'
/// stacks through the configured [`ThreadHooks`].
pub struct Gc {
    inner: Mutex<GcInner>,
    stats: GcStats,
}

// Safety: every pointer-bearing structure inside is owned by the heap and
// only touched under the inner mutex.
unsafe impl Send for Gc {}
unsafe impl Sync for Gc {}

impl Gc {
    /// Create a collector for a single-threaded host (no stacks are
    /// scanned; pin everything through roots and ranges).
    ///
    /// Panics on an invalid configuration.
    pub fn new(config: GcConfig) -> Self {
        Self::with_hooks(config, Box::new(NoopThreadHooks), None)
    }

    /// Create a collector wired to a host threading collaborator and
    /// finalizer callback.
    ///
    /// Panics on an invalid configuration.
    pub fn with_hooks(
        config: GcConfig,
        hooks: Box<dyn ThreadHooks>,
        finalizer: Option<FinalizeFn>,
    ) -> Self {
        config.validate().expect("invalid GC configuration");
        Self {
            inner: Mutex::new(GcInner {
                heap: Heap::new(config),
                roots: RootSet::new(),
                hooks,
                finalizer,
                disabled: 0,
                no_stack: 0,
            }),
            stats: GcStats::new(),
        }
    }

    /// Reject mutating calls made while this thread is collecting.
    fn gate(&self) -> Result<(), GcError> {
        if IN_COLLECT.with(|c| c.get()) {
            return Err(GcError::InvalidOperation);
        }
        Ok(())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate `size` bytes with the given [`attr`] bits.
    ///
    /// Zero-size requests round up to the smallest bin. The returned
    /// memory is not zeroed (use [`Gc::calloc`] for that).
    pub fn malloc(&self, size: usize, bits: u16) -> Result<NonNull<u8>, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();
        let (p, alloc_size) = self.malloc_locked(&mut inner, size, bits)?;
        self.stats.record_allocation(alloc_size);
        Ok(p)
    }

    /// Allocate `size` zeroed bytes with the given [`attr`] bits.
    pub fn calloc(&self, size: usize, bits: u16) -> Result<NonNull<u8>, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();
        let (p, alloc_size) = self.malloc_locked(&mut inner, size, bits)?;
        // SAFETY: the block spans alloc_size writable bytes.
        unsafe {
            std::ptr::write_bytes(p.as_ptr(), 0, alloc_size);
        }
        self.stats.record_allocation(alloc_size);
        Ok(p)
    }

    /// Resize a block.
    ///
    /// `realloc(null, size)` allocates; `realloc(p, 0)` frees and returns
    /// null. Large blocks resize in place when the page layout allows;
    /// otherwise the block moves if it must grow or would waste more than
    /// half its capacity, and stays put (reporting the old capacity)
    /// otherwise. When `bits` is zero the old attribute bits carry over.
    pub fn realloc(&self, p: *mut u8, size: usize, bits: u16) -> Result<*mut u8, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();

        if p.is_null() {
            if size == 0 {
                return Ok(std::ptr::null_mut());
            }
            let (q, alloc_size) = self.malloc_locked(&mut inner, size, bits)?;
            self.stats.record_allocation(alloc_size);
            return Ok(q.as_ptr());
        }
        if size == 0 {
            inner.heap.free(p);
            return Ok(std::ptr::null_mut());
        }

        let addr = p as usize;
        let psize = inner.heap.find_size(addr);
        let bits = if bits != 0 {
            bits
        } else {
            inner.heap.get_attr(addr)
        };

        if psize >= PAGE_SIZE && size >= PAGE_SIZE {
            if inner.heap.resize_large_in_place(addr, size).is_some() {
                if bits != 0 {
                    inner.heap.clr_attr(addr, attr::ALL);
                    inner.heap.set_attr(addr, bits);
                }
                return Ok(p);
            }
        }

        if size > psize || psize > 2 * size {
            // Move. The old block is left for the collector: conservative
            // aliases may still reference it.
            let (q, alloc_size) = self.malloc_locked(&mut inner, size, bits)?;
            let ncopy = psize.min(size);
            if ncopy > 0 {
                // SAFETY: distinct blocks; ncopy is within both.
                unsafe {
                    std::ptr::copy_nonoverlapping(p, q.as_ptr(), ncopy);
                }
            }
            self.stats.record_allocation(alloc_size);
            return Ok(q.as_ptr());
        }

        // The existing capacity still covers the request.
        if bits != 0 {
            inner.heap.clr_attr(addr, attr::ALL);
            inner.heap.set_attr(addr, bits);
        }
        Ok(p)
    }

    /// Grow a large block in place by at least `minsize` and at most
    /// `maxsize` additional bytes of trailing free pages.
    ///
    /// Returns the new total capacity in bytes, or 0 if the block is not
    /// a large block or fewer than `minsize` bytes were available; state
    /// is unchanged on 0.
    pub fn extend(&self, p: *mut u8, minsize: usize, maxsize: usize) -> Result<usize, GcError> {
        self.gate()?;
        if p.is_null() {
            return Ok(0);
        }
        let mut inner = self.inner.lock();
        Ok(inner.heap.extend(p as usize, minsize, maxsize))
    }

    /// Pre-map at least `size` bytes of small-object pool. Returns the
    /// mapped byte count.
    pub fn reserve(&self, size: usize) -> Result<usize, GcError> {
        self.gate()?;
        if size == 0 {
            return Ok(0);
        }
        let mut inner = self.inner.lock();
        match inner.heap.new_pool(pages_for(size), false) {
            Some(bytes) => {
                self.stats.record_pools_created(1);
                Ok(bytes)
            }
            None => Err(GcError::OutOfMemory),
        }
    }

    /// Explicitly free a block. Null, foreign and interior pointers are
    /// ignored.
    pub fn free(&self, p: *mut u8) -> Result<(), GcError> {
        self.gate()?;
        if p.is_null() {
            return Ok(());
        }
        self.inner.lock().heap.free(p);
        Ok(())
    }

    fn malloc_locked(
        &self,
        inner: &mut GcInner,
        size: usize,
        bits: u16,
    ) -> Result<(NonNull<u8>, usize), GcError> {
        let bin = Bin::for_size(size);
        let (p, alloc_size) = if bin.is_small() {
            (self.alloc_small(inner, bin)?, bin.size())
        } else {
            let npages = pages_for(size);
            (self.alloc_big(inner, npages)?, npages * PAGE_SIZE)
        };
        if bits != 0 {
            inner.heap.set_attr(p.as_ptr() as usize, bits);
        }
        Ok((p, alloc_size))
    }

    /// Small-allocation retry ladder: collect once (unless disabled),
    /// grow if the yield was poor, and give up only after both.
    fn alloc_small(&self, inner: &mut GcInner, bin: Bin) -> Result<NonNull<u8>, GcError> {
        let mut state = 0u8;
        let mut collected = false;
        loop {
            if let Some(p) = inner.heap.alloc_small_fast(bin) {
                return Ok(p);
            }
            match state {
                0 => {
                    // Nothing to collect from an empty heap.
                    if inner.disabled > 0 || inner.heap.pools.is_empty() {
                        state = 1;
                        continue;
                    }
                    let result = self.collect_locked(inner, true);
                    collected = true;
                    let threshold = inner.heap.pools.len() * inner.heap.config.pool_pages
                        / inner.heap.config.small_collect_divisor;
                    if result.page_yield() < threshold {
                        self.grow(inner, 1, false)?;
                        state = 2;
                    } else {
                        state = 1;
                    }
                }
                1 => {
                    self.grow(inner, 1, false)?;
                    state = 2;
                }
                _ => {
                    if collected {
                        return Err(GcError::OutOfMemory);
                    }
                    state = 0;
                }
            }
        }
    }

    /// Large-allocation retry ladder. Empty pools are released before
    /// growth so a fragmented heap shrinks instead of accreting.
    fn alloc_big(&self, inner: &mut GcInner, npages: usize) -> Result<NonNull<u8>, GcError> {
        let mut state = 0u8;
        let mut collected = false;
        loop {
            if let Some(p) = inner.heap.alloc_big_fast(npages) {
                return Ok(p);
            }
            match state {
                0 => {
                    // Nothing to collect from an empty heap.
                    if inner.disabled > 0 || inner.heap.pools.is_empty() {
                        state = 1;
                        continue;
                    }
                    let result = self.collect_locked(inner, true);
                    collected = true;
                    let threshold = inner.heap.pools.len() * inner.heap.config.pool_pages
                        / inner.heap.config.large_collect_divisor;
                    if result.page_yield() < threshold {
                        self.minimize_locked(inner);
                        self.grow(inner, npages, true)?;
                        state = 2;
                    } else {
                        state = 1;
                    }
                }
                1 => {
                    self.minimize_locked(inner);
                    self.grow(inner, npages, true)?;
                    state = 2;
                }
                _ => {
                    if collected {
                        return Err(GcError::OutOfMemory);
                    }
                    state = 0;
                }
            }
        }
    }

    fn grow(&self, inner: &mut GcInner, npages: usize, is_large: bool) -> Result<(), GcError> {
        match inner.heap.new_pool(npages, is_large) {
            Some(_) => {
                self.stats.record_pools_created(1);
                Ok(())
            }
            None => Err(GcError::OutOfMemory),
        }
    }

    fn minimize_locked(&self, inner: &mut GcInner) {
        let released = inner.heap.minimize();
        if released > 0 {
            self.stats.record_pools_released(released);
        }
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Run a full stop-the-world collection.
    pub fn collect(&self) -> Result<CollectResult, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();
        Ok(self.collect_locked(&mut inner, true))
    }

    /// Run a full collection without scanning thread stacks or registers.
    pub fn collect_no_stack(&self) -> Result<CollectResult, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();
        inner.no_stack += 1;
        let result = self.collect_locked(&mut inner, true);
        inner.no_stack -= 1;
        Ok(result)
    }

    /// Release every fully free pool back to the OS. Returns how many
    /// pools were unmapped.
    pub fn minimize(&self) -> Result<usize, GcError> {
        self.gate()?;
        let mut inner = self.inner.lock();
        let released = inner.heap.minimize();
        if released > 0 {
            self.stats.record_pools_released(released);
        }
        Ok(released)
    }

    /// Re-enable ladder-driven collections after a [`Gc::disable`].
    ///
    /// Panics when not paired with a `disable`.
    pub fn enable(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.disabled > 0, "enable without matching disable");
        inner.disabled -= 1;
    }

    /// Suspend ladder-driven collections; the allocator grows the heap
    /// instead. Explicit [`Gc::collect`] calls still work. Nests.
    pub fn disable(&self) {
        self.inner.lock().disabled += 1;
    }

    fn collect_locked(&self, inner: &mut GcInner, scan_stacks: bool) -> CollectResult {
        IN_COLLECT.with(|c| c.set(true));
        let timer = CollectTimer::start();

        // The hooks leave the struct for the duration so the collector
        // can borrow the rest of it mutably.
        let mut hooks = std::mem::replace(&mut inner.hooks, Box::new(NoopThreadHooks));
        let result = collector::full_collect(
            &mut inner.heap,
            &inner.roots,
            hooks.as_mut(),
            inner.finalizer,
            scan_stacks && inner.no_stack == 0,
        );
        inner.hooks = hooks;

        if inner.heap.config.verify_heap {
            inner.heap.verify();
        }
        let pause = timer.stop();
        self.stats
            .record_collection(pause, result.pages_freed, result.pages_recovered);
        if inner.heap.config.trace {
            eprintln!(
                "gc: freed {} pages, recovered {} pages ({} bytes) in {:?}",
                result.pages_freed, result.pages_recovered, result.bytes_freed, pause
            );
        }
        IN_COLLECT.with(|c| c.set(false));
        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Base address of the block containing `p`, or null for foreign
    /// pointers and free memory.
    pub fn addr_of(&self, p: *mut u8) -> *mut u8 {
        if p.is_null() {
            return std::ptr::null_mut();
        }
        self.inner.lock().heap.find_base(p as usize) as *mut u8
    }

    /// Capacity of the block containing `p`, or 0.
    pub fn size_of(&self, p: *mut u8) -> usize {
        if p.is_null() {
            return 0;
        }
        self.inner.lock().heap.find_size(p as usize)
    }

    /// Full description of the block containing `p`.
    pub fn query(&self, p: *mut u8) -> BlkInfo {
        if p.is_null() {
            return BlkInfo::null();
        }
        self.inner.lock().heap.get_info(p as usize)
    }

    /// Sanity-check a pointer that is supposed to reference a live
    /// allocation. Panics on corruption; null is a no-op.
    pub fn check(&self, p: *mut u8) {
        self.inner.lock().heap.check(p);
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Current [`attr`] bits of the block at `p` (0 for foreign pointers).
    pub fn get_attr(&self, p: *mut u8) -> u16 {
        if p.is_null() {
            return 0;
        }
        self.inner.lock().heap.get_attr(p as usize)
    }

    /// Set [`attr`] bits on the block at `p`; returns the previous mask.
    pub fn set_attr(&self, p: *mut u8, mask: u16) -> u16 {
        if p.is_null() {
            return 0;
        }
        self.inner.lock().heap.set_attr(p as usize, mask)
    }

    /// Clear [`attr`] bits on the block at `p`; returns the previous mask.
    pub fn clr_attr(&self, p: *mut u8, mask: u16) -> u16 {
        if p.is_null() {
            return 0;
        }
        self.inner.lock().heap.clr_attr(p as usize, mask)
    }

    // =========================================================================
    // Roots and ranges
    // =========================================================================

    /// Register a pointer value as a root: the block it references stays
    /// live across collections.
    pub fn add_root(&self, p: *mut u8) {
        self.inner.lock().roots.add_root(p);
    }

    /// Unregister a root added with [`Gc::add_root`]. Unknown roots are
    /// ignored.
    pub fn remove_root(&self, p: *mut u8) {
        self.inner.lock().roots.remove_root(p);
    }

    /// Visit every registered root under the lock.
    pub fn roots_for_each(&self, mut f: impl FnMut(*mut u8)) {
        for &root in self.inner.lock().roots.roots() {
            f(root);
        }
    }

    /// Register `[p, p + size)` to be scanned for pointers during
    /// collection.
    pub fn add_range(&self, p: *mut u8, size: usize) {
        self.inner.lock().roots.add_range(p, size);
    }

    /// Unregister the range starting at `p`. Unknown ranges are ignored.
    pub fn remove_range(&self, p: *mut u8) {
        self.inner.lock().roots.remove_range(p);
    }

    /// Visit every registered range as `(base, size)` under the lock.
    pub fn ranges_for_each(&self, mut f: impl FnMut(*mut u8, usize)) {
        for range in self.inner.lock().roots.ranges() {
            f(range.pbot, range.ptop as usize - range.pbot as usize);
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Cumulative allocator/collector counters.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Point-in-time heap occupancy snapshot.
    pub fn heap_stats(&self) -> HeapStats {
        self.inner.lock().heap.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_gc() -> Gc {
        Gc::new(GcConfig {
            pool_pages: 16,
            verify_heap: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_malloc_size_lower_bound() {
        let gc = test_gc();
        for &n in &[1usize, 16, 17, 100, 2048, 2049, 5000, 3 * PAGE_SIZE] {
            let p = gc.malloc(n, attr::NO_SCAN).expect("malloc failed");
            assert!(gc.size_of(p.as_ptr()) >= n, "size_of < n for n={}", n);
        }
        assert_eq!(gc.size_of(std::ptr::null_mut()), 0);
    }

    #[test]
    fn test_zero_size_malloc_rounds_up() {
        let gc = test_gc();
        let p = gc.malloc(0, 0).expect("malloc failed");
        assert_eq!(gc.size_of(p.as_ptr()), 16);
    }

    #[test]
    fn test_calloc_zeroes() {
        let gc = test_gc();
        let p = gc.calloc(256, attr::NO_SCAN).expect("calloc failed");
        let bytes = unsafe { std::slice::from_raw_parts(p.as_ptr(), 256) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_addr_of_identity() {
        let gc = test_gc();
        let p = gc.malloc(100, attr::NO_SCAN).expect("malloc failed");
        let base = p.as_ptr();
        let capacity = gc.size_of(base);
        assert_eq!(capacity, 128);
        for k in (0..capacity).step_by(4) {
            assert_eq!(gc.addr_of(unsafe { base.add(k) }), base);
        }
        assert_eq!(gc.query(base).base, base);
        assert_eq!(gc.query(base).size, capacity);
    }

    #[test]
    fn test_free_then_addr_of_null() {
        let gc = test_gc();
        let p = gc.malloc(64, 0).expect("malloc failed");
        gc.free(p.as_ptr()).expect("free failed");
        assert!(gc.addr_of(p.as_ptr()).is_null());
        assert_eq!(gc.size_of(p.as_ptr()), 0);
        assert_eq!(gc.query(p.as_ptr()), BlkInfo::null());
    }

    #[test]
    fn test_foreign_pointers_are_ignored() {
        let gc = test_gc();
        let mut local = 0u8;
        gc.free(&mut local as *mut u8).expect("free failed");
        assert!(gc.addr_of(&mut local as *mut u8).is_null());
        assert_eq!(gc.size_of(&mut local as *mut u8), 0);
        assert_eq!(gc.get_attr(&mut local as *mut u8), 0);
    }

    #[test]
    fn test_realloc_keeps_block_when_capacity_covers() {
        let gc = test_gc();
        let p = gc.malloc(100, attr::NO_SCAN).expect("malloc failed");
        // 128-byte bin; shrinking within half the capacity keeps it.
        let q = gc.realloc(p.as_ptr(), 90, 0).expect("realloc failed");
        assert_eq!(q, p.as_ptr());
        // Growing past the bin moves the block.
        let q = gc.realloc(p.as_ptr(), 200, 0).expect("realloc failed");
        assert_ne!(q, p.as_ptr());
        assert!(gc.size_of(q) >= 200);
        // Attributes carried over.
        assert_eq!(gc.get_attr(q), attr::NO_SCAN);
    }

    #[test]
    fn test_realloc_null_and_zero() {
        let gc = test_gc();
        let p = gc.realloc(std::ptr::null_mut(), 32, 0).expect("realloc failed");
        assert!(!p.is_null());
        let q = gc.realloc(p, 0, 0).expect("realloc failed");
        assert!(q.is_null());
        assert!(gc.addr_of(p).is_null());
    }

    #[test]
    fn test_realloc_large_shrink_in_place() {
        let gc = test_gc();
        let p = gc
            .malloc(5 * PAGE_SIZE, attr::NO_SCAN)
            .expect("malloc failed");
        let free_before = gc.heap_stats().free_pages;
        let q = gc
            .realloc(p.as_ptr(), 2 * PAGE_SIZE, 0)
            .expect("realloc failed");
        assert_eq!(q, p.as_ptr());
        assert_eq!(gc.size_of(q), 2 * PAGE_SIZE);
        assert_eq!(gc.heap_stats().free_pages, free_before + 3);
    }

    #[test]
    fn test_disable_blocks_ladder_collection() {
        let gc = test_gc();
        gc.disable();
        // Exhaust the first pool; the ladder must grow, not collect.
        for _ in 0..(16 * PAGE_SIZE / 2048) + 1 {
            gc.malloc(2048, attr::NO_SCAN).expect("malloc failed");
        }
        assert_eq!(gc.stats().collections.load(Ordering::Relaxed), 0);
        assert!(gc.stats().pools_created.load(Ordering::Relaxed) >= 2);
        gc.enable();
    }

    #[test]
    #[should_panic(expected = "enable without matching disable")]
    fn test_unbalanced_enable_panics() {
        let gc = test_gc();
        gc.enable();
    }

    #[test]
    fn test_reserve_maps_a_pool() {
        let gc = test_gc();
        let bytes = gc.reserve(3 * PAGE_SIZE).expect("reserve failed");
        assert!(bytes >= 3 * PAGE_SIZE);
        assert_eq!(gc.heap_stats().pool_count, 1);
        // The reserved pool serves small allocations without growing.
        gc.malloc(64, 0).expect("malloc failed");
        assert_eq!(gc.heap_stats().pool_count, 1);
    }

    #[test]
    fn test_collect_reclaims_unrooted() {
        let gc = test_gc();
        let live = gc.malloc(32, attr::NO_SCAN).expect("malloc failed");
        let dead = gc.malloc(32, attr::NO_SCAN).expect("malloc failed");
        gc.add_root(live.as_ptr());

        let result = gc.collect().expect("collect failed");
        assert!(result.bytes_freed >= 32);
        assert_eq!(gc.addr_of(live.as_ptr()), live.as_ptr());
        assert!(gc.addr_of(dead.as_ptr()).is_null());
        assert_eq!(gc.stats().collections.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_collect_no_stack_runs() {
        let gc = test_gc();
        let p = gc.malloc(32, attr::NO_SCAN).expect("malloc failed");
        gc.add_root(p.as_ptr());
        gc.collect_no_stack().expect("collect failed");
        assert_eq!(gc.addr_of(p.as_ptr()), p.as_ptr());
    }

    static FINALIZED: AtomicUsize = AtomicUsize::new(0);

    unsafe fn count_finalize(_p: *mut u8, _detached: bool, _reset: bool) {
        FINALIZED.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_finalizer_runs_at_sweep() {
        let gc = Gc::with_hooks(
            GcConfig {
                pool_pages: 16,
                verify_heap: true,
                ..Default::default()
            },
            Box::new(NoopThreadHooks),
            Some(count_finalize),
        );
        let p = gc
            .malloc(64, attr::FINALIZE | attr::NO_SCAN)
            .expect("malloc failed");
        let addr = p.as_ptr();
        FINALIZED.store(0, Ordering::Relaxed);
        gc.collect().expect("collect failed");
        assert_eq!(FINALIZED.load(Ordering::Relaxed), 1);
        assert!(gc.addr_of(addr).is_null());

        // A second collection must not finalize it again.
        gc.collect().expect("collect failed");
        assert_eq!(FINALIZED.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_check_accepts_live_block() {
        let gc = test_gc();
        let p = gc.malloc(48, 0).expect("malloc failed");
        gc.check(p.as_ptr());
        gc.check(std::ptr::null_mut());
    }

    #[test]
    #[should_panic(expected = "free list")]
    fn test_check_rejects_freed_block() {
        let gc = test_gc();
        let p = gc.malloc(48, 0).expect("malloc failed");
        gc.free(p.as_ptr()).expect("free failed");
        gc.check(p.as_ptr());
    }
}
