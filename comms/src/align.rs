/// Element types of a receive buffer. Their 4 byte alignment lets an `f32` params
/// payload be viewed in place, without copying it out of the buffer.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
