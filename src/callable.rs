// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! [`SmallCallable`]: a move-only, single-shot, type-erased `FnOnce() + Send` bounded
//! to one cache line. Small closures (the common case — a handful of captured words)
//! live inline; anything bigger falls back to one heap allocation. Either way the type
//! itself stays a fixed size, which is what lets [`crate::queue::BoundedQueue`] store a
//! homogeneous ring of "whatever work a producer handed us" without boxing every cell.
//!
//! The source this crate is modeled on exposes three trampolines per stored type:
//! move-then-destroy, execute-then-destroy, and destroy. Rust only needs two of those:
//! relocating a `SmallCallable` is an ordinary struct move (the compiler memcpy's the
//! inline buffer or the heap pointer and statically forbids touching the source
//! afterwards), so there is no "move trampoline" to write by hand — only `call` and
//! `drop` are type-erased operations.

use std::alloc::{self, Layout};
use std::mem::{self, MaybeUninit};
use std::ptr;

const TOTAL_SIZE: usize = 64;
const BUFFER_SIZE: usize = TOTAL_SIZE - mem::size_of::<usize>();

static_assertions::const_assert_eq!(mem::size_of::<*const VTable>() + BUFFER_SIZE, TOTAL_SIZE);

/// The two trampolines every stored callable type needs: run-once (call + drop the
/// value) and drop-without-calling.
struct VTable {
    call: unsafe fn(target: *mut Buffer),
    drop: unsafe fn(target: *mut Buffer),
}

type Buffer = MaybeUninit<[u8; BUFFER_SIZE]>;

/// Whether an `F` fits in the inline buffer. Alignment beyond `usize` isn't supported —
/// an over-aligned closure always goes on the heap.
const fn fits_inline<F>() -> bool {
    mem::size_of::<F>() <= BUFFER_SIZE && mem::align_of::<F>() <= mem::align_of::<usize>()
}

unsafe fn call_inline<F: FnOnce()>(target: *mut Buffer) {
    // Safety: caller guarantees `target` holds a live, inline `F`, not yet called.
    unsafe {
        let f = target.cast::<F>().read();
        f();
    }
}

unsafe fn call_heap<F: FnOnce()>(target: *mut Buffer) {
    // Safety: caller guarantees `target` holds a `*mut F` from a heap allocation we
    // own and haven't freed yet.
    unsafe {
        let ptr = target.cast::<*mut F>().read();
        let f = ptr::read(ptr);
        alloc::dealloc(ptr.cast::<u8>(), Layout::new::<F>());
        f();
    }
}

unsafe fn drop_inline<F>(target: *mut Buffer) {
    // Safety: caller guarantees `target` holds a live, inline `F`.
    unsafe {
        ptr::drop_in_place(target.cast::<F>());
    }
}

unsafe fn drop_heap<F>(target: *mut Buffer) {
    // Safety: caller guarantees `target` holds a `*mut F` from a heap allocation we own.
    unsafe {
        let ptr = target.cast::<*mut F>().read();
        ptr::drop_in_place(ptr);
        alloc::dealloc(ptr.cast::<u8>(), Layout::new::<F>());
    }
}

// A function-local `static` inside a generic function is *not* instantiated once per
// monomorphization — it's one shared slot for the whole function body, regardless of
// `F`. An associated `const` on a generic type, by contrast, genuinely is evaluated
// once per instantiation of `Holder<F>`, and promotes to its own `'static` memory for
// each one, which is what actually gives every distinct `F` its own `VTable`.
struct Holder<F>(std::marker::PhantomData<F>);

impl<F: FnOnce() + Send + 'static> Holder<F> {
    const VTABLE: VTable = if fits_inline::<F>() {
        VTable {
            call: call_inline::<F>,
            drop: drop_inline::<F>,
        }
    } else {
        VTable {
            call: call_heap::<F>,
            drop: drop_heap::<F>,
        }
    };
}

fn vtable_for<F: FnOnce() + Send + 'static>() -> &'static VTable {
    &Holder::<F>::VTABLE
}

/// A move-only, single-shot, type-erased `FnOnce() + Send`, stored inline when it fits
/// in one cache line minus a vtable pointer, and on the heap otherwise.
///
/// Calling [`Self::invoke`] more than once, or after the callable has been moved out
/// of, is a contract violation; see the method docs.
pub struct SmallCallable {
    vtable: Option<&'static VTable>,
    buffer: Buffer,
}

// Safety: `buffer` only ever holds a `Send` closure (inline) or a pointer to one
// (heap), and exactly one thread touches it at a time.
unsafe impl Send for SmallCallable {}

impl SmallCallable {
    /// Moves `f` into a new `SmallCallable`, choosing inline or heap storage based on
    /// `F`'s size and alignment.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let vtable = vtable_for::<F>();
        let mut buffer: Buffer = MaybeUninit::uninit();

        if fits_inline::<F>() {
            // Safety: the buffer has room for `F` by construction of `fits_inline`.
            unsafe {
                buffer.as_mut_ptr().cast::<F>().write(f);
            }
        } else {
            let ptr = Box::into_raw(Box::new(f));
            // Safety: a `*mut F` always fits in a `usize`-sized, `usize`-aligned slot.
            unsafe {
                buffer.as_mut_ptr().cast::<*mut F>().write(ptr);
            }
        }

        Self {
            vtable: Some(vtable),
            buffer,
        }
    }

    /// `true` if this callable has already been invoked or moved out of.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vtable.is_none()
    }

    /// Runs the stored callable exactly once, consuming it.
    ///
    /// # Panics
    ///
    /// Panics if the callable is already empty (already invoked). This mirrors the
    /// source contract ("calling `invoke()` when empty is a contract violation")
    /// rather than silently no-op'ing.
    pub fn invoke(mut self) {
        let vtable = self
            .vtable
            .take()
            .expect("SmallCallable::invoke called on an empty callable");
        // Safety: `vtable` corresponds to the type that was written into `self.buffer`
        // by `new`, and `.take()` proves this is the first and only invocation.
        unsafe {
            (vtable.call)(&mut self.buffer);
        }
        mem::forget(self);
    }
}

impl Drop for SmallCallable {
    fn drop(&mut self) {
        if let Some(vtable) = self.vtable.take() {
            // Safety: `vtable` matches the live value in `self.buffer`, and dropping
            // without calling is always a valid trampoline to run.
            unsafe {
                (vtable.drop)(&mut self.buffer);
            }
        }
    }
}

impl std::fmt::Debug for SmallCallable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmallCallable")
            .field("empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_small_closure_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let callable = SmallCallable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        callable.invoke();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn heap_large_closure_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        // Oversized capture forces heap storage.
        let padding = [0u8; 128];
        let callable = SmallCallable::new(move || {
            std::hint::black_box(&padding);
            c.fetch_add(1, Ordering::SeqCst);
        });
        callable.invoke();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "empty callable")]
    fn invoke_after_manual_empty_panics() {
        let mut callable = SmallCallable::new(|| {});
        callable.vtable.take();
        callable.invoke();
    }

    #[test]
    fn drop_without_invoke_runs_destructor_not_body() {
        struct DropSpy(Arc<AtomicUsize>);
        impl Drop for DropSpy {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let spy = DropSpy(drops.clone());
        let invoked = Arc::new(AtomicUsize::new(0));
        let inv = invoked.clone();
        let callable = SmallCallable::new(move || {
            let _spy = &spy;
            inv.fetch_add(1, Ordering::SeqCst);
        });
        drop(callable);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn size_is_one_cache_line() {
        assert_eq!(mem::size_of::<SmallCallable>(), TOTAL_SIZE);
    }
}
