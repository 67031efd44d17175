//! xmlwalk - memory-bounded streaming XML walker
//!
//! Walks a document once, calling a [`Handler`] for every element that
//! matches a [`TagFilter`], and prunes the tree behind itself so memory
//! follows document depth instead of document size.
//!
//! Layers:
//! - reader: event source over quick-xml (namespaces, text, end tags)
//! - dom: frontier arena holding the live part of the tree
//! - strategy: the pruning walker
//! - validate: streaming DTD and XML Schema validation
//! - sink: CSV row writer
//!
//! ```no_run
//! use xmlwalk::{CsvRowWriter, Session, SessionConfig, TagFilter};
//!
//! let config = SessionConfig::new("input.xml").tag(TagFilter::parse("r")?);
//! let stats = Session::run(&config, CsvRowWriter::append("output.csv")?)?;
//! println!("{} rows", stats.elements_dispatched);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core;
pub mod dom;
pub mod error;
pub mod filter;
pub mod handler;
pub mod lifecycle;
pub mod reader;
pub mod session;
pub mod sink;
pub mod strategy;
pub mod validate;

pub use dom::{ElementRef, NamespaceMap, NamespaceRegistry, NamespaceSnapshot};
pub use error::{Error, HandlerError, Location, Result};
pub use filter::{TagFilter, TagPattern};
pub use handler::{DispatchContext, Handler, HandlerBinding};
pub use lifecycle::{ensure_input_readable, is_non_empty_file, remove_if_present, RemoveOutcome};
pub use reader::{EventSource, SourceEvent, SourceOptions, StartTag};
pub use session::{Session, SessionConfig};
pub use sink::CsvRowWriter;
pub use strategy::{PruningWalker, WalkState, WalkStats};
pub use validate::Schema;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                PEAK_ALLOCATED.fetch_max(current, Ordering::Relaxed);
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Memory Statistics
// ============================================================================

/// Heap usage counters; all zero unless built with `memory_tracking`
pub mod memory {
    #[cfg(feature = "memory_tracking")]
    use std::sync::atomic::Ordering;

    /// Bytes currently allocated
    #[cfg(feature = "memory_tracking")]
    pub fn current() -> usize {
        super::tracking::ALLOCATED.load(Ordering::SeqCst)
    }

    /// Highest allocation since start
    #[cfg(feature = "memory_tracking")]
    pub fn peak() -> usize {
        super::tracking::PEAK_ALLOCATED.load(Ordering::SeqCst)
    }

    #[cfg(not(feature = "memory_tracking"))]
    pub fn current() -> usize {
        0
    }

    #[cfg(not(feature = "memory_tracking"))]
    pub fn peak() -> usize {
        0
    }

}
