//! Unified JPEG 2000 data model.
//!
//! One coherent set of structures shared by the parser, writer, encoder and
//! decoder: main-header parameters (`J2kCod`, `J2kQcd`, `J2kCap`, `J2kRoi`),
//! geometry (`J2kImage`, `J2kComponentInfo`), and the per-tile coefficient
//! tree (`J2kTile` → `J2kTileComponent` → `J2kResolution` → `J2kSubband` →
//! `J2kCodeBlock`).

/// Per-component geometry and sample format, from the SIZ marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct J2kComponentInfo {
    /// Bit depth, 1..=38.
    pub depth: u8,
    pub is_signed: bool,
    /// Horizontal / vertical sub-sampling factor (XRsiz/YRsiz).
    pub dx: u8,
    pub dy: u8,
}

/// Image and tiling geometry plus main-header parameters, as read from SIZ
/// (and the COD/QCD/CAP/RGN marker segments that follow it).
#[derive(Debug, Clone, Default)]
pub struct J2kImage {
    pub width: u32,
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub component_count: u32,
    pub components: Vec<J2kComponentInfo>,
    pub cod: Option<J2kCod>,
    pub qcd: Option<J2kQcd>,
    pub cap: Option<J2kCap>,
    pub roi: Option<J2kRoi>,
    pub com: Vec<J2kComment>,
    pub tiles: Vec<J2kTile>,
    /// Highest layer index fully consumed so far (progressive decode tracking).
    pub decoded_layers: u32,
}

impl J2kImage {
    pub fn num_tiles_x(&self) -> u32 {
        if self.tile_width == 0 {
            1
        } else {
            (self.x_origin + self.width - self.tile_x_origin).div_ceil(self.tile_width)
        }
    }

    pub fn num_tiles_y(&self) -> u32 {
        if self.tile_height == 0 {
            1
        } else {
            (self.y_origin + self.height - self.tile_y_origin).div_ceil(self.tile_height)
        }
    }

    pub fn num_tiles(&self) -> u32 {
        self.num_tiles_x() * self.num_tiles_y()
    }
}

/// Coding Style Default (COD) marker information.
#[derive(Debug, Clone, Default)]
pub struct J2kCod {
    pub coding_style: u8,
    pub progression_order: u8,
    pub number_of_layers: u16,
    /// Multi-component transform: 0 none, 1 RCT/ICT on the first 3 components.
    pub mct: u8,
    pub decomposition_levels: u8,
    pub codeblock_width_exp: u8,
    pub codeblock_height_exp: u8,
    pub codeblock_style: u8,
    /// 0 = irreversible 9/7, 1 = reversible 5/3.
    pub transformation: u8,
    /// One `(ppx, ppy)` pair per resolution level when `coding_style & 1 != 0`.
    pub precinct_sizes: Vec<(u8, u8)>,
}

impl J2kCod {
    pub const SOP: u8 = 0x02;
    pub const EPH: u8 = 0x04;
    pub const EXPLICIT_PRECINCTS: u8 = 0x01;

    pub fn precinct_size(&self, resolution: usize) -> (u8, u8) {
        self.precinct_sizes
            .get(resolution)
            .copied()
            .unwrap_or((15, 15))
    }
}

/// Quantization Default (QCD) marker information.
#[derive(Debug, Clone, Default)]
pub struct J2kQcd {
    /// Bits 0-4: style (0 none, 1 scalar derived, 2 scalar expounded).
    pub quant_style: u8,
    pub guard_bits: u8,
    /// One entry per subband: (exponent, mantissa) packed as read from the
    /// marker (11-bit mantissa for style 2, 0 otherwise).
    pub step_sizes: Vec<(u8, u16)>,
}

/// Capability (CAP) marker information (Part 15 / HTJ2K signalling).
#[derive(Debug, Clone, Default)]
pub struct J2kCap {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

impl J2kCap {
    pub const HTJ2K_BIT: u32 = 1 << 14;

    pub fn is_htj2k(&self) -> bool {
        self.pcap & Self::HTJ2K_BIT != 0
    }
}

/// Region of Interest (RGN) marker information.
#[derive(Debug, Clone, Copy)]
pub struct J2kRoi {
    pub component_index: u16,
    /// 0 = MaxShift (the only style defined by Part 1 Table A.23).
    pub roi_style: u8,
    pub shift_value: u8,
}

#[derive(Debug, Clone)]
pub struct J2kComment {
    pub registration: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct J2kTile {
    pub index: u32,
    pub components: Vec<J2kTileComponent>,
}

#[derive(Debug, Clone, Default)]
pub struct J2kTileComponent {
    pub component_index: u32,
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    pub resolutions: Vec<J2kResolution>,
    /// Working sample buffer: level-shifted samples pre-DWT, DWT
    /// coefficients post-DWT. Row-major, `width * height` entries.
    pub data: Vec<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct J2kResolution {
    pub level: u8,
    pub width: u32,
    pub height: u32,
    pub subbands: Vec<J2kSubband>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubbandOrientation {
    #[default]
    LL,
    HL,
    LH,
    HH,
}

#[derive(Debug, Clone, Default)]
pub struct J2kSubband {
    pub orientation: SubbandOrientation,
    /// Subband-relative origin within the tile-component's DWT domain.
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    /// Quantization step exponent/mantissa resolved for this subband.
    pub exponent: u8,
    pub mantissa: u16,
    pub codeblock_width: u32,
    pub codeblock_height: u32,
    pub codeblocks: Vec<J2kCodeBlock>,
    /// Dequantized coefficients, row-major, `width * height` entries.
    pub data: Vec<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct J2kCodeBlock {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    /// Per-layer compressed byte ranges produced/consumed so far.
    pub layer_data: Vec<Vec<u8>>,
    /// Per-layer, per-pass byte length of the passes newly included in that
    /// layer (parallel to `layer_data`): `layer_data[l]` is the
    /// concatenation of `pass_lengths_by_layer[l]`'s slices, letting T1
    /// decode re-synchronize the MQ decoder at each TERMALL boundary.
    pub pass_lengths_by_layer: Vec<Vec<u32>>,
    pub layers_decoded: u8,
    pub zero_bit_planes: u8,
    pub total_passes: u8,
    /// True once this block has appeared (been "included") in some packet.
    pub seen: bool,
}

impl J2kCodeBlock {
    pub fn all_bytes(&self) -> Vec<u8> {
        self.layer_data.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_count_single_tile() {
        let image = J2kImage {
            width: 512,
            height: 512,
            tile_width: 512,
            tile_height: 512,
            ..Default::default()
        };
        assert_eq!(image.num_tiles(), 1);
    }

    #[test]
    fn tile_count_grid() {
        let image = J2kImage {
            width: 1000,
            height: 600,
            tile_width: 256,
            tile_height: 256,
            ..Default::default()
        };
        assert_eq!(image.num_tiles_x(), 4);
        assert_eq!(image.num_tiles_y(), 3);
    }
}
