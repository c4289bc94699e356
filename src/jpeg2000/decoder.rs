//! Decoder pipeline: codestream parsing, Tier-2 packet decode, EBCOT/HTJ2K
//! Tier-1 decode, dequantization, inverse DWT, inverse MCT, inverse DC level
//! shift — the mirror image of `encoder.rs`.

use std::collections::HashMap;

use crate::error::J2kError;
use crate::DecoderOptions;

use super::bit_io::J2kBitReader;
use super::block_coder::block_coder_for;
use super::dwt::{Dwt53, Dwt97};
use super::geometry::{ceil_div, codeblock_grid, component_bounds, tile_bounds};
use super::image::{
    J2kCod, J2kCodeBlock, J2kImage, J2kQcd, J2kResolution, J2kRoi, J2kSubband, J2kTile, J2kTileComponent,
    SubbandOrientation,
};
use super::marker::J2kMarkerCode;
use super::mct;
use super::packet::{packet_order, CodeBlockInfo, PacketHeader, PrecinctState};
use super::parser::J2kParser;
use super::quantization::{dequantize_reversible, dequantize_scalar, level_shift_inverse, step_size, subband_range_bits};
use super::reader::J2kStreamReader;
use super::roi::apply_inverse_by_magnitude;

const GUARD_BITS: u8 = 2;

enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

pub struct J2kDecoder {
    options: DecoderOptions,
}

impl J2kDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn decode(&self, data: &[u8]) -> Result<J2kImage, J2kError> {
        let mut reader = J2kStreamReader::new(data);
        let mut parser = J2kParser::new(&mut reader);
        let marker = parser.parse_main_header()?;
        if marker != J2kMarkerCode::StartOfTile {
            return Err(J2kError::MalformedStream("codestream has no tile parts".into()));
        }

        let is_htj2k = parser.image.cap.as_ref().map(|c| c.is_htj2k()).unwrap_or(false);

        loop {
            let tp_start = parser.reader.position();
            let (psot, isot) = parser.parse_tile_part_header()?;
            let data_start = parser.reader.position();
            let consumed_header = data_start - tp_start;
            let tile_data_len = if psot == 0 {
                parser.reader.remaining_data().len()
            } else {
                (psot as usize).saturating_sub(2).saturating_sub(consumed_header)
            };
            let tile_data = parser.reader.read_bytes(tile_data_len.min(parser.reader.remaining_data().len()))?;

            match self.decode_tile(&parser.image, isot, tile_data, is_htj2k) {
                Ok(tile) => parser.image.tiles.push(tile),
                Err(e) => {
                    if self.options.strict {
                        return Err(e);
                    }
                    log::warn!("tile {isot} failed to decode: {e}");
                }
            }

            if parser.reader.remaining_data().len() < 2 {
                break;
            }
            let next = parser.reader.read_u16()?;
            if next == J2kMarkerCode::EndOfCodestream as u16 {
                break;
            }
            if next != J2kMarkerCode::StartOfTile as u16 {
                let err = J2kError::MalformedStream("expected SOT or EOC after tile data".into());
                if self.options.strict {
                    return Err(err);
                }
                log::warn!("{err}");
                break;
            }
        }

        Ok(*parser.image)
    }

    fn decode_tile(
        &self,
        image: &J2kImage,
        tile_index: u16,
        tile_data: &[u8],
        is_htj2k: bool,
    ) -> Result<J2kTile, J2kError> {
        let cod = image
            .cod
            .as_ref()
            .ok_or_else(|| J2kError::MalformedStream("tile has no COD".into()))?;
        let qcd = image
            .qcd
            .as_ref()
            .ok_or_else(|| J2kError::MalformedStream("tile has no QCD".into()))?;
        let lossless = cod.transformation == 1;
        let num_layers = cod.number_of_layers as u32;
        let num_resolutions = cod.decomposition_levels + 1;
        let num_components = image.components.len();
        let cb_w = 1u32 << (cod.codeblock_width_exp + 2);
        let cb_h = 1u32 << (cod.codeblock_height_exp + 2);

        let tile_w = if image.tile_width == 0 { image.width } else { image.tile_width };
        let tile_h = if image.tile_height == 0 { image.height } else { image.tile_height };
        let ntx = image.num_tiles_x().max(1);
        let tx = tile_index as u32 % ntx;
        let ty = tile_index as u32 / ntx;
        let (tx0, ty0, tx1, ty1) = tile_bounds(
            image.x_origin,
            image.y_origin,
            image.x_origin + image.width,
            image.y_origin + image.height,
            image.tile_x_origin,
            image.tile_y_origin,
            tile_w,
            tile_h,
            tx,
            ty,
        );

        let mut resolutions_per_component: Vec<Vec<J2kResolution>> = Vec::with_capacity(num_components);
        let mut comp_dims: Vec<(u32, u32, u32, u32)> = Vec::with_capacity(num_components);
        for info in &image.components {
            let (cx0, cy0, cx1, cy1) = component_bounds(tx0, ty0, tx1, ty1, info.dx, info.dy);
            let (w, h) = (cx1 - cx0, cy1 - cy0);
            comp_dims.push((cx0, cy0, w, h));
            resolutions_per_component.push(build_resolution_skeleton(
                w,
                h,
                cod.decomposition_levels,
                cb_w,
                cb_h,
                qcd,
                info.depth,
                num_layers,
            ));
        }

        self.parse_packets(
            tile_data,
            &mut resolutions_per_component,
            cod,
            num_layers,
            num_resolutions,
            num_components as u32,
        )?;

        let mut samples_vec = Vec::with_capacity(num_components);
        for (c, info) in image.components.iter().enumerate() {
            let (cx0, cy0, _, _) = comp_dims[c];
            let roi = image.roi.filter(|r| r.component_index as usize == c);
            let samples = self.decode_component(
                &mut resolutions_per_component[c],
                cod.decomposition_levels,
                cx0,
                cy0,
                info.depth,
                lossless,
                is_htj2k,
                roi.as_ref(),
            )?;
            samples_vec.push(samples);
        }

        if cod.mct == 1 && num_components >= 3 {
            if lossless {
                let (first, rest) = samples_vec.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                match (&mut first[0], &mut second[0], &mut third[0]) {
                    (Samples::Int(y), Samples::Int(cb), Samples::Int(cr)) => {
                        mct::inverse_rct(y, cb, cr);
                    }
                    _ => return Err(J2kError::InternalError("lossless tile has non-integer samples".into())),
                }
            } else {
                let (first, rest) = samples_vec.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                match (&first[0], &second[0], &third[0]) {
                    (Samples::Float(y), Samples::Float(cb), Samples::Float(cr)) => {
                        let (r, g, b) = mct::inverse_ict(y, cb, cr);
                        first[0] = Samples::Int(r);
                        second[0] = Samples::Int(g);
                        third[0] = Samples::Int(b);
                    }
                    _ => return Err(J2kError::InternalError("lossy tile has non-float samples".into())),
                }
            }
        }

        let mut out_components = Vec::with_capacity(num_components);
        for (c, info) in image.components.iter().enumerate() {
            let (cx0, cy0, w, h) = comp_dims[c];
            let mut data = match std::mem::replace(&mut samples_vec[c], Samples::Int(Vec::new())) {
                Samples::Int(v) => v,
                Samples::Float(v) => v.into_iter().map(|x| x.round() as i32).collect(),
            };
            for v in data.iter_mut() {
                *v = level_shift_inverse(*v, info.depth, info.is_signed);
            }
            out_components.push(J2kTileComponent {
                component_index: c as u32,
                x0: cx0,
                y0: cy0,
                width: w,
                height: h,
                resolutions: std::mem::take(&mut resolutions_per_component[c]),
                data,
            });
        }

        Ok(J2kTile { index: tile_index as u32, components: out_components })
    }

    /// Parses every packet of the tile in one pass: all packet headers share
    /// a single continuous bit reader (mirroring how `encoder.rs` writes them
    /// with a single bit writer before appending the concatenated bodies),
    /// then the code-block byte ranges are sliced off the remainder in the
    /// same order the headers were read.
    fn parse_packets(
        &self,
        tile_data: &[u8],
        resolutions_per_component: &mut [Vec<J2kResolution>],
        cod: &J2kCod,
        num_layers: u32,
        num_resolutions: u8,
        num_components: u32,
    ) -> Result<(), J2kError> {
        let progression = crate::ProgressionOrder::from_wire(cod.progression_order)?;
        let order = packet_order(progression, num_layers, num_resolutions, num_components, |_, _| 1);

        let mut states: HashMap<(u8, u32, usize), PrecinctState> = HashMap::new();
        let mut bit_reader = J2kBitReader::new(tile_data);
        let mut parsed: Vec<(usize, u8, usize, u32, Vec<CodeBlockInfo>)> = Vec::new();

        for id in &order {
            let resolution = &resolutions_per_component[id.component as usize][id.resolution as usize];
            for (s, subband) in resolution.subbands.iter().enumerate() {
                let (gw, gh) = codeblock_grid(subband.width, subband.height, subband.codeblock_width, subband.codeblock_height);
                let state = states
                    .entry((id.resolution, id.component, s))
                    .or_insert_with(|| PrecinctState::new(gw as usize, gh as usize));
                let header = PacketHeader::read(&mut bit_reader, state, id.layer, gw as usize, gh as usize)
                    .map_err(|_| J2kError::Truncated("packet header read past end of tile data".into()))?;
                parsed.push((id.component as usize, id.resolution, s, id.layer, header.included_cblks));
            }
        }

        let body_start = bit_reader.position().min(tile_data.len());
        let body = &tile_data[body_start..];
        let mut cursor = 0usize;
        for (c, r, s, layer, included) in parsed {
            let subband = &mut resolutions_per_component[c][r as usize].subbands[s];
            let (gw, _) = codeblock_grid(subband.width, subband.height, subband.codeblock_width, subband.codeblock_height);
            for info in included {
                let len = info.data_len as usize;
                if cursor + len > body.len() {
                    return Err(J2kError::Truncated("packet body ran past tile data".into()));
                }
                let idx = info.y * gw as usize + info.x;
                let cb = &mut subband.codeblocks[idx];
                while cb.layer_data.len() <= layer as usize {
                    cb.layer_data.push(Vec::new());
                }
                while cb.pass_lengths_by_layer.len() <= layer as usize {
                    cb.pass_lengths_by_layer.push(Vec::new());
                }
                cb.layer_data[layer as usize] = body[cursor..cursor + len].to_vec();
                cb.pass_lengths_by_layer[layer as usize] = info.pass_lengths.clone();
                cursor += len;
                if info.newly_included {
                    cb.zero_bit_planes = info.zero_bp;
                }
                cb.seen = true;
                cb.layers_decoded = (layer + 1) as u8;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_component(
        &self,
        resolutions: &mut [J2kResolution],
        levels: u8,
        x0: u32,
        y0: u32,
        depth: u8,
        lossless: bool,
        is_htj2k: bool,
        roi: Option<&J2kRoi>,
    ) -> Result<Samples, J2kError> {
        let mut coder = block_coder_for(is_htj2k);

        if let Some(r) = roi {
            if r.roi_style != 0 {
                let msg = "RGN general scaling has no shape information in the codestream and cannot be reversed without out-of-band ROI geometry";
                if self.options.strict {
                    return Err(J2kError::UnsupportedFeature(msg.into()));
                }
                log::warn!("{msg}");
            }
        }

        for resolution in resolutions.iter_mut() {
            for subband in resolution.subbands.iter_mut() {
                let mb = GUARD_BITS.saturating_add(subband.exponent).saturating_sub(1);
                let (gw, _gh) = codeblock_grid(subband.width, subband.height, subband.codeblock_width, subband.codeblock_height);
                for cb in subband.codeblocks.iter_mut() {
                    let bytes = cb.all_bytes();
                    let pass_lengths: Vec<u32> = cb.pass_lengths_by_layer.iter().flatten().copied().collect();
                    let mut coeffs = vec![0i32; (cb.width * cb.height) as usize];
                    if cb.seen && !bytes.is_empty() && cb.zero_bit_planes < mb {
                        let max_bit_plane = mb.saturating_sub(1).saturating_sub(cb.zero_bit_planes);
                        match coder.decode_block(&bytes, cb.width, cb.height, subband.orientation, max_bit_plane, &pass_lengths) {
                            Ok(values) => coeffs = values,
                            Err(e) => {
                                if self.options.strict {
                                    return Err(e);
                                }
                                log::warn!("code-block at ({}, {}) failed to decode, zero-filling: {e}", cb.x0, cb.y0);
                            }
                        }
                    }
                    if let Some(r) = roi {
                        if r.roi_style == 0 {
                            apply_inverse_by_magnitude(&mut coeffs, r.shift_value);
                        }
                    }
                    for y in 0..cb.height {
                        let dst = ((cb.y0 + y) * subband.width + cb.x0) as usize;
                        let src = (y * cb.width) as usize;
                        subband.data[dst..dst + cb.width as usize]
                            .copy_from_slice(&coeffs[src..src + cb.width as usize]);
                    }
                }
                let _ = gw;
            }
        }

        let range_for = |orientation: SubbandOrientation| -> u8 {
            subband_range_bits(depth, gain_bits(orientation))
        };

        if lossless {
            let mut ll: Vec<i32> = resolutions[0].subbands[0]
                .data
                .iter()
                .map(|&q| dequantize_reversible(q))
                .collect();
            let chain = level_chain(resolutions[levels as usize].width, resolutions[levels as usize].height, x0, y0, levels);
            for level in 1..=levels {
                let k = (levels - level) as usize;
                let (w, h, cx0, cy0) = chain[k];
                let resolution = &resolutions[level as usize];
                let hl: Vec<i32> = resolution.subbands[0].data.iter().map(|&q| dequantize_reversible(q)).collect();
                let lh: Vec<i32> = resolution.subbands[1].data.iter().map(|&q| dequantize_reversible(q)).collect();
                let hh: Vec<i32> = resolution.subbands[2].data.iter().map(|&q| dequantize_reversible(q)).collect();
                let mut out = vec![0i32; (w * h) as usize];
                Dwt53::inverse_2d(&ll, &hl, &lh, &hh, w, h, cx0, cy0, &mut out);
                ll = out;
            }
            Ok(Samples::Int(ll))
        } else {
            let ll_range = range_for(SubbandOrientation::LL);
            let ll_step = step_size(ll_range, resolutions[0].subbands[0].exponent, resolutions[0].subbands[0].mantissa);
            let mut ll: Vec<f32> = resolutions[0].subbands[0]
                .data
                .iter()
                .map(|&q| dequantize_scalar(q, ll_step))
                .collect();
            let chain = level_chain(resolutions[levels as usize].width, resolutions[levels as usize].height, x0, y0, levels);
            for level in 1..=levels {
                let k = (levels - level) as usize;
                let (w, h, cx0, cy0) = chain[k];
                let resolution = &resolutions[level as usize];
                let hl_range = range_for(SubbandOrientation::HL);
                let hh_range = range_for(SubbandOrientation::HH);
                let hl_step = step_size(hl_range, resolution.subbands[0].exponent, resolution.subbands[0].mantissa);
                let lh_step = step_size(hl_range, resolution.subbands[1].exponent, resolution.subbands[1].mantissa);
                let hh_step = step_size(hh_range, resolution.subbands[2].exponent, resolution.subbands[2].mantissa);
                let hl: Vec<f32> = resolution.subbands[0].data.iter().map(|&q| dequantize_scalar(q, hl_step)).collect();
                let lh: Vec<f32> = resolution.subbands[1].data.iter().map(|&q| dequantize_scalar(q, lh_step)).collect();
                let hh: Vec<f32> = resolution.subbands[2].data.iter().map(|&q| dequantize_scalar(q, hh_step)).collect();
                let mut out = vec![0.0f32; (w * h) as usize];
                Dwt97::inverse_2d(&ll, &hl, &lh, &hh, w, h, cx0, cy0, &mut out);
                ll = out;
            }
            Ok(Samples::Float(ll))
        }
    }
}

fn gain_bits(orientation: SubbandOrientation) -> u8 {
    match orientation {
        SubbandOrientation::LL => 0,
        SubbandOrientation::HL | SubbandOrientation::LH => 1,
        SubbandOrientation::HH => 2,
    }
}

/// Dimensions entering each successive forward DWT level, `chain[0]` the
/// full tile-component size and `chain[levels]` the LL band's size; the
/// encoder produces the identical sequence while decomposing. Called with
/// the full tile-component size, which `build_resolution_skeleton` stores
/// as the finest resolution's `(width, height)`.
fn level_chain(w0: u32, h0: u32, x0: u32, y0: u32, levels: u8) -> Vec<(u32, u32, u32, u32)> {
    let mut chain = Vec::with_capacity(levels as usize + 1);
    chain.push((w0, h0, x0, y0));
    let (mut w, mut h, mut cx, mut cy) = (w0, h0, x0, y0);
    for _ in 0..levels {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        cx = ceil_div(cx as i64, 2) as u32;
        cy = ceil_div(cy as i64, 2) as u32;
        chain.push((w, h, cx, cy));
    }
    chain
}

fn qcd_exponent(qcd: &J2kQcd, idx: usize) -> (u8, u16) {
    qcd.step_sizes.get(idx).copied().unwrap_or((0, 0))
}

#[allow(clippy::too_many_arguments)]
fn build_resolution_skeleton(
    w: u32,
    h: u32,
    levels: u8,
    cb_w: u32,
    cb_h: u32,
    qcd: &J2kQcd,
    depth: u8,
    num_layers: u32,
) -> Vec<J2kResolution> {
    let mut resolutions: Vec<J2kResolution> = (0..=levels)
        .map(|l| J2kResolution { level: l, width: 0, height: 0, subbands: Vec::new() })
        .collect();

    let mut cur_w = w;
    let mut cur_h = h;
    for level in (1..=levels).rev() {
        let low_w = cur_w.div_ceil(2);
        let high_w = cur_w / 2;
        let low_h = cur_h.div_ceil(2);
        let high_h = cur_h / 2;
        resolutions[level as usize].width = cur_w;
        resolutions[level as usize].height = cur_h;

        let base = 1 + (level as usize - 1) * 3;
        let (hl_e, hl_m) = qcd_exponent(qcd, base);
        let (lh_e, lh_m) = qcd_exponent(qcd, base + 1);
        let (hh_e, hh_m) = qcd_exponent(qcd, base + 2);
        resolutions[level as usize].subbands = vec![
            subband_skeleton(SubbandOrientation::HL, high_w, low_h, cb_w, cb_h, hl_e, hl_m, depth, num_layers),
            subband_skeleton(SubbandOrientation::LH, low_w, high_h, cb_w, cb_h, lh_e, lh_m, depth, num_layers),
            subband_skeleton(SubbandOrientation::HH, high_w, high_h, cb_w, cb_h, hh_e, hh_m, depth, num_layers),
        ];

        cur_w = low_w;
        cur_h = low_h;
    }

    let (ll_e, ll_m) = qcd_exponent(qcd, 0);
    resolutions[0].width = cur_w;
    resolutions[0].height = cur_h;
    resolutions[0].subbands = vec![subband_skeleton(
        SubbandOrientation::LL,
        cur_w,
        cur_h,
        cb_w,
        cb_h,
        ll_e,
        ll_m,
        depth,
        num_layers,
    )];

    resolutions
}

#[allow(clippy::too_many_arguments)]
fn subband_skeleton(
    orientation: SubbandOrientation,
    w: u32,
    h: u32,
    cb_w: u32,
    cb_h: u32,
    exponent: u8,
    mantissa: u16,
    depth: u8,
    num_layers: u32,
) -> J2kSubband {
    let exponent = if exponent == 0 {
        subband_range_bits(depth, gain_bits(orientation))
    } else {
        exponent
    };
    let (gw, gh) = codeblock_grid(w, h, cb_w, cb_h);
    let mut codeblocks = Vec::with_capacity((gw * gh) as usize);
    for gy in 0..gh {
        for gx in 0..gw {
            let bx0 = gx * cb_w;
            let by0 = gy * cb_h;
            codeblocks.push(J2kCodeBlock {
                x0: bx0,
                y0: by0,
                width: cb_w.min(w - bx0),
                height: cb_h.min(h - by0),
                layer_data: Vec::with_capacity(num_layers as usize),
                pass_lengths_by_layer: Vec::with_capacity(num_layers as usize),
                layers_decoded: 0,
                zero_bit_planes: 0,
                total_passes: 0,
                seen: false,
            });
        }
    }
    J2kSubband {
        orientation,
        x0: 0,
        y0: 0,
        width: w,
        height: h,
        exponent,
        mantissa,
        codeblock_width: cb_w,
        codeblock_height: cb_h,
        codeblocks,
        data: vec![0i32; (w * h) as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::encoder::{EncodeInput, J2kEncoder};
    use crate::jpeg2000::image::J2kComponentInfo;
    use crate::EncoderOptions;

    fn gradient(w: u32, h: u32) -> Vec<i32> {
        (0..w * h).map(|i| (i % 200 + 10) as i32).collect()
    }

    #[test]
    fn roundtrips_a_small_lossless_grayscale_tile() {
        let options = EncoderOptions {
            num_levels: 2,
            lossless: true,
            code_block_w: 16,
            code_block_h: 16,
            num_layers: 1,
            mct: false,
            ..Default::default()
        };
        let encoder = J2kEncoder::new(options).unwrap();
        let samples = gradient(32, 32);
        let input = EncodeInput {
            width: 32,
            height: 32,
            components: vec![J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }],
            samples: &[samples.clone()],
        };
        let bytes = encoder.encode(&input).unwrap();

        let decoder = J2kDecoder::new(DecoderOptions::default());
        let image = decoder.decode(&bytes).unwrap();
        assert_eq!(image.width, 32);
        assert_eq!(image.tiles.len(), 1);
        let comp = &image.tiles[0].components[0];
        assert_eq!(comp.data.len(), samples.len());
        assert_eq!(comp.data, samples);
    }

    #[test]
    fn strict_mode_rejects_truncated_stream() {
        let options = EncoderOptions {
            num_levels: 1,
            lossless: true,
            code_block_w: 16,
            code_block_h: 16,
            num_layers: 1,
            mct: false,
            ..Default::default()
        };
        let encoder = J2kEncoder::new(options).unwrap();
        let samples = gradient(16, 16);
        let input = EncodeInput {
            width: 16,
            height: 16,
            components: vec![J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }],
            samples: &[samples],
        };
        let mut bytes = encoder.encode(&input).unwrap();
        bytes.truncate(bytes.len() - 4);

        let decoder = J2kDecoder::new(DecoderOptions { strict: true });
        assert!(decoder.decode(&bytes).is_err());
    }
}
