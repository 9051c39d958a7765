//! Basic usage of `DataSection`: register constants, finalize, emit.

use std::io::Cursor;
use std::sync::Arc;

use data_section::{DataItem, DataSection};
use new_zealand::nz;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let section = DataSection::new();

    // A boxed double constant, an interned string and some zeroed table slots.
    let double = Arc::new(DataItem::raw(nz!(8), 2.5_f64.to_le_bytes().to_vec()));
    let string = Arc::new(DataItem::raw(nz!(1), b"hello".to_vec()));
    let table = Arc::new(DataItem::zeroed(nz!(4), 16));

    let double_ref = section.insert(&double)?;
    let string_ref = section.insert(&string)?;
    let table_ref = section.insert(&table)?;

    // Registering the same item again returns the same handle.
    assert_eq!(section.insert(&double)?, double_ref);

    section.finalize()?;

    println!(
        "section: {} bytes, {}-aligned",
        section.size()?,
        section.alignment()?
    );
    println!("  double @ {}", double_ref.offset()?);
    println!("  string @ {}", string_ref.offset()?);
    println!("  table  @ {}", table_ref.offset()?);

    let mut buffer = Cursor::new(vec![0_u8; section.size()?]);
    section.emit(&mut buffer, &mut |_patch| {})?;

    println!("bytes: {:02X?}", buffer.into_inner());
    Ok(())
}
