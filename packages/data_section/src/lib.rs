//! Layout engine for the constant data section that accompanies generated machine code.
//!
//! A code generator's backend places constant pools, boxed literals and lookup
//! tables in a read-only data section next to the emitted code. This crate
//! provides [`DataSection`], which collects such items incrementally, computes
//! a packed layout honoring each item's alignment requirement, and later emits
//! the section's bytes into caller-provided memory while forwarding relocation
//! records ([`DataPatch`]) for bytes whose final value depends on addresses
//! resolved later.
//!
//! # Key features
//!
//! - **Identity deduplication**: inserting the same [`DataItem`] twice yields
//!   the same [`DataRef`] handle and stores the item once
//! - **Stable handles**: a [`DataRef`] stays valid forever, regardless of
//!   packing decisions made after it was issued
//! - **Packed layout**: items are placed at the smallest suitable offsets under
//!   heterogeneous alignment constraints, with no trailing padding
//! - **Section merging**: independently assembled sections compose via
//!   [`DataSection::transfer_from()`] without invalidating any handle
//! - **Repeatable emission**: a finalized section can be emitted any number of
//!   times, concurrently, with byte-identical results
//! - **Opaque byte production**: each item's bytes come from a callback, with
//!   [`DataItem::raw()`] and [`DataItem::zeroed()`] as built-in conveniences
//!
//! # Lifecycle
//!
//! A section starts out accepting registrations, possibly from several threads
//! at once. At a single well-defined point the caller finalizes it, which runs
//! the layout planner exactly once and fixes every item's offset. From then on
//! the section is immutable: size and alignment queries, handle lookups and
//! emission passes are all safe to run concurrently.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use data_section::{DataItem, DataSection};
//! use new_zealand::nz;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let section = DataSection::new();
//!
//! // An 8-byte constant that must be 8-aligned and a 3-byte blob.
//! let constant = Arc::new(DataItem::raw(nz!(8), 1.5_f64.to_le_bytes().to_vec()));
//! let blob = Arc::new(DataItem::raw(nz!(1), vec![1, 2, 3]));
//!
//! let constant_ref = section.insert(&constant)?;
//! let blob_ref = section.insert(&blob)?;
//!
//! section.finalize()?;
//!
//! // The blob packs first (smaller alignment), the constant lands at 8.
//! assert_eq!(blob_ref.offset()?, 0);
//! assert_eq!(constant_ref.offset()?, 8);
//! assert_eq!(section.size()?, 16);
//!
//! let mut buffer = Cursor::new(vec![0_u8; section.size()?]);
//! section.emit(&mut buffer, &mut |_patch| {})?;
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod patch;
mod reference;
mod section;
mod sink;

pub use error::Error;
pub(crate) use error::Result;
pub use item::{DataItem, EmitFn};
pub use patch::{DataPatch, PatchTarget};
pub use reference::DataRef;
pub use section::DataSection;
pub use sink::DataSink;
