use std::io::{Cursor, Write};

/// Destination for the bytes of an emitted data section.
///
/// The emission pass positions the sink at each item's resolved offset and the
/// item's callback then appends its bytes. Any memory region that supports
/// "seek to absolute offset, then append" can back this trait; a blanket
/// implementation is provided for [`std::io::Cursor`] so that
/// `Cursor<Vec<u8>>` and `Cursor<&mut [u8]>` work out of the box.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
///
/// use data_section::DataSink;
///
/// let mut sink = Cursor::new(vec![0_u8; 8]);
/// sink.seek_to(4);
/// sink.write_bytes(&[0xAA, 0xBB]);
///
/// assert_eq!(sink.into_inner(), [0, 0, 0, 0, 0xAA, 0xBB, 0, 0]);
/// ```
pub trait DataSink {
    /// Positions the sink so that the next write lands `offset` bytes from the
    /// start of the section.
    fn seek_to(&mut self, offset: usize);

    /// Appends `bytes` at the current position, advancing the position past them.
    ///
    /// # Panics
    ///
    /// Implementations panic if the sink cannot hold the bytes. The emission
    /// buffer must hold at least the section size; a short buffer is a caller
    /// contract violation, not a recoverable condition.
    fn write_bytes(&mut self, bytes: &[u8]);
}

impl<T> DataSink for Cursor<T>
where
    Cursor<T>: Write,
{
    fn seek_to(&mut self, offset: usize) {
        self.set_position(u64::try_from(offset).expect("section offsets fit in u64"));
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_all(bytes)
            .expect("the emission buffer must hold at least the section size in bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_over_vec_seeks_and_appends() {
        let mut sink = Cursor::new(vec![0_u8; 4]);

        sink.seek_to(2);
        sink.write_bytes(&[1, 2]);
        sink.seek_to(0);
        sink.write_bytes(&[9]);

        assert_eq!(sink.into_inner(), [9, 0, 1, 2]);
    }

    #[test]
    fn cursor_over_slice_writes_in_place() {
        let mut buffer = [0_u8; 4];
        let mut sink = Cursor::new(buffer.as_mut_slice());

        sink.seek_to(1);
        sink.write_bytes(&[7, 8]);

        assert_eq!(buffer, [0, 7, 8, 0]);
    }

    #[test]
    #[should_panic]
    fn short_slice_panics() {
        let mut buffer = [0_u8; 2];
        let mut sink = Cursor::new(buffer.as_mut_slice());

        sink.write_bytes(&[1, 2, 3]);
    }
}
