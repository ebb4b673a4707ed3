/// Trait for memory primitives.
///
/// A primitive is either a byte, half-word, word or double-word: [`u8`], [`u16`], [`u32`] or
/// [`u64`]. Memory is big-endian, so every primitive is stored most significant byte first.
pub trait Primitive: Copy + std::fmt::Debug + std::fmt::UpperHex + Send + Sync + 'static {
    /// The size of this primitive, in bytes. Also its alignment.
    const SIZE: u32;

    /// Reads a value of this primitive from a buffer. If `buf` does not contain enough data, it's
    /// going to be completed with zeros.
    fn read_from(buf: &[u8]) -> Self;

    /// Writes this primitive to the given buffer. If `buf` is not big enough, remaining bytes are
    /// going to be silently dropped.
    fn write_to(self, buf: &mut [u8]);

    fn to_u64(self) -> u64;
    fn from_u64(value: u64) -> Self;

    /// Bit offset of the lane this primitive occupies inside the word containing `address`.
    ///
    /// Only meaningful for primitives up to a word wide.
    #[inline(always)]
    fn lane_shift(address: u32) -> u32 {
        debug_assert!(Self::SIZE <= 4);
        (4 - Self::SIZE - (address & (4 - Self::SIZE))) * 8
    }

    /// Mask of the lane this primitive occupies inside the word containing `address`.
    #[inline(always)]
    fn lane_mask(address: u32) -> u32 {
        let bits = (1u64 << (Self::SIZE * 8)) - 1;
        (bits as u32) << Self::lane_shift(address)
    }

    /// Extracts this primitive from the word containing `address`.
    #[inline(always)]
    fn from_word(word: u32, address: u32) -> Self {
        Self::from_u64(u64::from((word & Self::lane_mask(address)) >> Self::lane_shift(address)))
    }

    /// Positions this primitive inside the word containing `address`, returning the shifted value
    /// together with the mask of the bits it covers.
    #[inline(always)]
    fn to_word(self, address: u32) -> (u32, u32) {
        let shift = Self::lane_shift(address);
        ((self.to_u64() as u32) << shift, Self::lane_mask(address))
    }
}

macro_rules! impl_primitive {
    ($($type:ty),*) => {
        $(
            impl Primitive for $type {
                const SIZE: u32 = size_of::<$type>() as u32;

                #[inline(always)]
                fn read_from(buf: &[u8]) -> Self {
                    const SELF_SIZE: usize = size_of::<$type>();

                    /// Unhappy path for when `buf` is too small.
                    #[cold]
                    #[inline(never)]
                    fn read_unhappy(buf: &[u8]) -> $type {
                        let mut read_buf = [0u8; SELF_SIZE];
                        read_buf[..buf.len()].copy_from_slice(buf);
                        <$type>::from_be_bytes(read_buf)
                    }

                    match buf.first_chunk::<SELF_SIZE>() {
                        Some(bytes) => <$type>::from_be_bytes(*bytes),
                        None => read_unhappy(buf),
                    }
                }

                #[inline(always)]
                fn write_to(self, buf: &mut [u8]) {
                    let bytes = self.to_be_bytes();
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                }

                #[inline(always)]
                fn to_u64(self) -> u64 {
                    self as u64
                }

                #[inline(always)]
                fn from_u64(value: u64) -> Self {
                    value as $type
                }
            }
        )*
    };
}

impl_primitive! {
    u8,
    u16,
    u32,
    u64
}

pub trait PrimitiveRw<P>
where
    P: Primitive,
{
    fn read(&self) -> P;
    fn write(&mut self, value: P);
}

impl<P> PrimitiveRw<P> for [u8]
where
    P: Primitive,
{
    fn read(&self) -> P {
        P::read_from(self)
    }

    fn write(&mut self, value: P) {
        value.write_to(self);
    }
}
