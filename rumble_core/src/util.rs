/// Creates a boxed slice of `len` copies of the given element.
///
/// Used for the large memories (RDRAM, TLB lookup tables) so they never touch the stack.
pub fn boxed_slice<T>(value: T, len: usize) -> Box<[T]>
where
    T: Clone,
{
    vec![value; len].into_boxed_slice()
}

/// Merges `value` into `current`, changing only the bits selected by `mask`.
#[inline(always)]
pub const fn write_masked(current: u32, value: u32, mask: u32) -> u32 {
    (current & !mask) | (value & mask)
}
