use std::io;

/// Types that can be read back from a frame of the application layer protocol.
pub trait Deserialize<'a>: Sized {
    /// Deserializes `Self` from the frame's contents, possibly borrowing from it.
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
