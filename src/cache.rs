use crate::{Pixel, qoi_hash};

/// The 64 slot table of recently seen pixels, indexed by [`qoi_hash`].
///
/// Every slot starts out as `(0, 0, 0, 0)`. A fresh cache is created for
/// each decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCache {
    slots: [Pixel; 64],
}

impl Default for ColorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorCache {
    pub const fn new() -> Self {
        Self {
            slots: [Pixel::new(0, 0, 0, 0); 64],
        }
    }

    /// `index` is masked to six bits, so any byte is a valid slot.
    pub fn get(&self, index: u8) -> Pixel {
        self.slots[(index & 0x3f) as usize]
    }

    pub fn insert(&mut self, pixel: Pixel) {
        self.slots[qoi_hash(pixel)] = pixel;
    }

    /// Slot index of `pixel` if that slot currently holds it.
    pub fn find(&self, pixel: Pixel) -> Option<u8> {
        let index = qoi_hash(pixel);
        (self.slots[index] == pixel).then_some(index as u8)
    }
}
