//! Derived video-side caches.
//!
//! The video pipeline itself lives outside this core; it only ever
//! reads from the bus. What the core keeps here are the redundant,
//! decoded views of raw memory the pipeline consumes: an 8x8 pixel
//! cache per tile, a decoded record per OAM sprite, and the 4-entry
//! shade tables for the three palette registers. Each cache entry is
//! recomputed inside the write that mutates its backing bytes, never
//! independently.

/// Base of the tile-data window in VRAM.
const TILE_DATA_BASE: u16 = 0x8000;
/// One past the last tile-data byte ($8000-$97FF, 384 tiles of 16 bytes).
const TILE_DATA_END: u16 = 0x9800;
/// Base of the sprite attribute table.
const OAM_BASE: u16 = 0xFE00;

pub(crate) const TILE_COUNT: usize = 384;
pub(crate) const SPRITE_COUNT: usize = 40;

/// Decoded 8x8 tile: rows of 2-bit color indices (0-3).
pub type Tile = [[u8; 8]; 8];

/// DMG shade as selected through a palette register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Shade {
    #[default]
    White,
    Light,
    Dark,
    Black,
}

impl Shade {
    fn from_bits(bits: u8) -> Shade {
        match bits & 0x03 {
            0 => Shade::White,
            1 => Shade::Light,
            2 => Shade::Dark,
            _ => Shade::Black,
        }
    }
}

/// Decoded OAM entry.
///
/// Positions are stored screen-relative (the raw bytes carry the +16/+8
/// hardware offsets), flags are unpacked into booleans.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpriteAttr {
    pub y: i16,
    pub x: i16,
    pub tile: u8,
    /// OBJ-to-BG priority: true means the sprite hides behind BG colors 1-3.
    pub behind_bg: bool,
    pub flip_y: bool,
    pub flip_x: bool,
    /// false = OBP0, true = OBP1.
    pub palette1: bool,
}

pub(crate) struct VideoCaches {
    tiles: Box<[Tile; TILE_COUNT]>,
    sprites: [SpriteAttr; SPRITE_COUNT],
    bg_palette: [Shade; 4],
    obj_palette0: [Shade; 4],
    obj_palette1: [Shade; 4],
}

impl Default for VideoCaches {
    fn default() -> Self {
        Self {
            tiles: Box::new([[[0; 8]; 8]; TILE_COUNT]),
            sprites: [SpriteAttr::default(); SPRITE_COUNT],
            bg_palette: [Shade::White; 4],
            obj_palette0: [Shade::White; 4],
            obj_palette1: [Shade::White; 4],
        }
    }
}

impl VideoCaches {
    /// Re-decode the tile row containing `addr` from the raw bytes.
    ///
    /// Each row is two bytes: the low bit plane then the high bit plane,
    /// pixel 0 in bit 7. A no-op for addresses outside the tile-data
    /// window (tile maps at $9800-$9FFF carry no pixel data).
    pub(crate) fn update_tile(&mut self, addr: u16, memory: &[u8]) {
        if !(TILE_DATA_BASE..TILE_DATA_END).contains(&addr) {
            return;
        }

        let offset = (addr - TILE_DATA_BASE) as usize;
        let tile = offset / 16;
        let row = (offset % 16) / 2;
        let row_base = TILE_DATA_BASE as usize + tile * 16 + row * 2;
        let lo = memory[row_base];
        let hi = memory[row_base + 1];

        for x in 0..8 {
            let bit = 7 - x;
            let low = (lo >> bit) & 0x01;
            let high = (hi >> bit) & 0x01;
            self.tiles[tile][row][x] = (high << 1) | low;
        }
    }

    /// Re-decode the sprite record containing `addr` from the raw OAM bytes.
    pub(crate) fn update_sprite(&mut self, addr: u16, memory: &[u8]) {
        let offset = (addr - OAM_BASE) as usize;
        let index = offset / 4;
        if index >= SPRITE_COUNT {
            return;
        }

        let base = OAM_BASE as usize + index * 4;
        let flags = memory[base + 3];
        self.sprites[index] = SpriteAttr {
            y: memory[base] as i16 - 16,
            x: memory[base + 1] as i16 - 8,
            tile: memory[base + 2],
            behind_bg: flags & 0x80 != 0,
            flip_y: flags & 0x40 != 0,
            flip_x: flags & 0x20 != 0,
            palette1: flags & 0x10 != 0,
        };
    }

    /// Recompute a shade table from a freshly written palette register.
    pub(crate) fn update_palette(&mut self, addr: u16, value: u8) {
        let table = match addr {
            0xFF47 => &mut self.bg_palette,
            0xFF48 => &mut self.obj_palette0,
            0xFF49 => &mut self.obj_palette1,
            _ => return,
        };
        for (i, shade) in table.iter_mut().enumerate() {
            *shade = Shade::from_bits(value >> (i * 2));
        }
    }

    pub(crate) fn tile(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }

    pub(crate) fn sprite(&self, index: usize) -> &SpriteAttr {
        &self.sprites[index]
    }

    pub(crate) fn bg_palette(&self) -> &[Shade; 4] {
        &self.bg_palette
    }

    pub(crate) fn obj_palette(&self, palette1: bool) -> &[Shade; 4] {
        if palette1 {
            &self.obj_palette1
        } else {
            &self.obj_palette0
        }
    }
}
