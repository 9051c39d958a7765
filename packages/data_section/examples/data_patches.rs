//! Emitting a section that contains an address slot patched at link time.
//!
//! The slot's bytes reference another data item whose final memory address is
//! only known once an outer allocator places the section, so the slot's
//! callback reports a `DataPatch` instead of writing a meaningful value.

use std::io::Cursor;
use std::sync::Arc;

use data_section::{DataItem, DataPatch, DataSection, PatchTarget};
use new_zealand::nz;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let section = DataSection::new();

    let message = Arc::new(DataItem::raw(nz!(1), b"patched hello".to_vec()));
    let message_ref = section.insert(&message)?;

    // A pointer-sized slot that will eventually hold the message's address.
    let slot_target = message_ref.clone();
    let slot = Arc::new(DataItem::new(nz!(8), 8, move |sink, patches| {
        sink.write_bytes(&0_u64.to_le_bytes());
        patches(DataPatch::new(0, PatchTarget::Section(slot_target.clone())));
    }));
    let slot_ref = section.insert(&slot)?;

    section.finalize()?;

    let mut buffer = Cursor::new(vec![0_u8; section.size()?]);
    let mut patches = Vec::new();
    section.emit(&mut buffer, &mut |patch| patches.push(patch))?;

    println!("message @ {}", message_ref.offset()?);
    println!("slot    @ {}", slot_ref.offset()?);
    for patch in &patches {
        match &patch.target {
            PatchTarget::Section(target) => {
                println!(
                    "patch at {} -> section item at offset {}",
                    patch.offset,
                    target.offset()?
                );
            }
            PatchTarget::Symbol(name) => {
                println!("patch at {} -> symbol {name}", patch.offset);
            }
            _ => {}
        }
    }

    Ok(())
}
