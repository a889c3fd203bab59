/// Types that can be written into a frame of the application layer protocol.
pub trait Serialize<'a> {
    /// Writes the serialized form of `self` at the end of `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the frame's length prefix.
    ///
    /// # Returns
    /// An optional trailing slice that is written right after `buf` without copying it.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
