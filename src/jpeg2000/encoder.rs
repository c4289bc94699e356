//! Encoder pipeline: DC level shift, MCT, multi-level DWT, scalar
//! quantization, ROI coefficient scaling, EBCOT Tier-1, PCRD/TargetRatio
//! layer allocation, Tier-2 packet assembly, codestream framing.

use std::collections::HashMap;

use crate::error::J2kError;
use crate::EncoderOptions;

use super::bit_io::J2kBitWriter;
use super::block_coder::block_coder_for;
use super::dwt::{Dwt53, Dwt97};
use super::geometry::{ceil_div, codeblock_grid, component_bounds, tile_bounds};
use super::image::{
    J2kCod, J2kCodeBlock, J2kComponentInfo, J2kQcd, J2kResolution, J2kRoi, J2kSubband,
    SubbandOrientation,
};
use super::mct;
use super::packet::{packet_order, CodeBlockInfo, PacketHeader, PrecinctState};
use super::quantization::{
    level_shift_forward, quantize_reversible, quantize_scalar, step_size, subband_range_bits,
};
use super::rate_control::{pcrd_allocation, target_ratio_allocation, BudgetSchedule, CodeBlockPasses, PassInfo};
use super::roi::{rasterize, RoiMask, RoiStyle};
use super::writer::J2kWriter;

/// Guard bits (SQcd bits 5-7): extra headroom bit planes above the nominal
/// dynamic range, Annex E.1.
const GUARD_BITS: u8 = 2;

/// Per-component input to the encoder. `samples[c]` is sized to that
/// component's own (sub-sampled) grid: `ceil(width/dx) * ceil(height/dy)`
/// row-major samples, unshifted (as they'd appear in the source image).
pub struct EncodeInput<'a> {
    pub width: u32,
    pub height: u32,
    pub components: Vec<J2kComponentInfo>,
    pub samples: &'a [Vec<i32>],
}

/// A code-block's T1 output plus the bookkeeping rate control needs, before
/// a layer schedule assigns it to a packet.
struct EncodedBlock {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    compressed: Vec<u8>,
    /// Each TERMALL-terminated coding pass's incremental byte cost and
    /// distortion-reduction estimate, in coding order (empty when
    /// `has_data` is false).
    passes: Vec<PassInfo>,
    zero_bp: u8,
    has_data: bool,
}

/// Sum of the first `count` passes' byte costs.
fn cumulative_bytes(passes: &[PassInfo], count: u32) -> u32 {
    passes[..count as usize].iter().map(|p| p.rate).sum()
}

pub struct J2kEncoder {
    options: EncoderOptions,
}

impl J2kEncoder {
    pub fn new(mut options: EncoderOptions) -> Result<Self, J2kError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn encode(&self, input: &EncodeInput) -> Result<Vec<u8>, J2kError> {
        if input.components.len() != input.samples.len() {
            return Err(J2kError::InvalidParameters(
                "component info count must match sample buffer count".into(),
            ));
        }
        if input.components.is_empty() {
            return Err(J2kError::InvalidParameters("at least one component is required".into()));
        }
        for (c, info) in input.components.iter().enumerate() {
            let cw = ceil_div(input.width as i64, info.dx.max(1) as i64) as u32;
            let ch = ceil_div(input.height as i64, info.dy.max(1) as i64) as u32;
            if input.samples[c].len() != (cw * ch) as usize {
                return Err(J2kError::InvalidParameters(format!(
                    "component {c} sample buffer is {} samples, expected {}",
                    input.samples[c].len(),
                    cw * ch
                )));
            }
        }

        let roi_mask = match &self.options.roi {
            Some(cfg) => Some(RoiMask {
                width: input.width,
                height: input.height,
                mask: rasterize(&cfg.geometry, input.width, input.height)?,
                style: cfg.style,
                shift: cfg.shift,
            }),
            None => None,
        };

        let tile_w = if self.options.tile_w == 0 { input.width } else { self.options.tile_w };
        let tile_h = if self.options.tile_h == 0 { input.height } else { self.options.tile_h };
        let num_tiles_x = input.width.div_ceil(tile_w.max(1));
        let num_tiles_y = input.height.div_ceil(tile_h.max(1));

        let cod = self.build_cod();
        let qcd = self.build_qcd(input.components[0].depth);

        let mut writer = J2kWriter::new();
        writer.write_soc();
        writer.write_siz(input.width, input.height, tile_w, tile_h, &input.components);
        writer.write_cod(&cod);
        writer.write_qcd(&qcd);
        if let Some(cfg) = &self.options.roi {
            writer.write_rgn(&J2kRoi {
                component_index: 0,
                roi_style: match cfg.style {
                    RoiStyle::MaxShift => 0,
                    RoiStyle::GeneralScaling => 1,
                },
                shift_value: cfg.shift,
            });
        }

        let mut tile_index: u16 = 0;
        for ty in 0..num_tiles_y {
            for tx in 0..num_tiles_x {
                let (tx0, ty0, tx1, ty1) =
                    tile_bounds(0, 0, input.width, input.height, 0, 0, tile_w, tile_h, tx, ty);
                let tile_bytes = self.encode_tile(input, roi_mask.as_ref(), tx0, ty0, tx1, ty1)?;
                let psot = tile_bytes.len() as u32 + 14;
                writer.write_sot(tile_index, psot, 0, 1);
                writer.write_sod();
                writer.write_bytes(&tile_bytes);
                tile_index += 1;
            }
        }
        writer.write_eoc();
        Ok(writer.into_bytes())
    }

    fn build_cod(&self) -> J2kCod {
        let mut coding_style = 0u8;
        let mut precinct_sizes = Vec::new();
        if let (Some(ppx), Some(ppy)) = (self.options.precinct_w, self.options.precinct_h) {
            coding_style |= J2kCod::EXPLICIT_PRECINCTS;
            precinct_sizes = vec![(ppx, ppy); self.options.num_levels as usize + 1];
        }
        J2kCod {
            coding_style,
            progression_order: self.options.progression_order.to_wire(),
            number_of_layers: self.options.num_layers,
            mct: if self.options.mct { 1 } else { 0 },
            decomposition_levels: self.options.num_levels,
            codeblock_width_exp: self.options.code_block_w.trailing_zeros() as u8 - 2,
            codeblock_height_exp: self.options.code_block_h.trailing_zeros() as u8 - 2,
            codeblock_style: if self.options.term_all_passes { 0x04 } else { 0 },
            transformation: if self.options.lossless { 1 } else { 0 },
            precinct_sizes,
        }
    }

    /// Builds the default QCD entry using `depth` as a representative
    /// component bit depth (main-header QCD applies to every component that
    /// doesn't carry its own QCC override; this encoder never emits QCC).
    fn build_qcd(&self, depth: u8) -> J2kQcd {
        let style = if self.options.lossless { 0x00 } else { 0x02 };
        let mut step_sizes = vec![(self.subband_exponent(depth, 0), 0u16)];
        for _level in 1..=self.options.num_levels {
            step_sizes.push((self.subband_exponent(depth, 1), 0));
            step_sizes.push((self.subband_exponent(depth, 1), 0));
            step_sizes.push((self.subband_exponent(depth, 2), 0));
        }
        J2kQcd {
            quant_style: (GUARD_BITS << 5) | style,
            guard_bits: GUARD_BITS,
            step_sizes,
        }
    }

    fn subband_exponent(&self, depth: u8, gain_bits: u8) -> u8 {
        let range_bits = subband_range_bits(depth, gain_bits);
        if self.options.lossless {
            range_bits
        } else {
            self.derive_exponent(range_bits)
        }
    }

    fn encode_tile(
        &self,
        input: &EncodeInput,
        roi_mask: Option<&RoiMask>,
        tx0: u32,
        ty0: u32,
        tx1: u32,
        ty1: u32,
    ) -> Result<Vec<u8>, J2kError> {
        let n = input.components.len();
        let mut tile_samples: Vec<Vec<i32>> = Vec::with_capacity(n);
        let mut comp_dims: Vec<(u32, u32, u32, u32)> = Vec::with_capacity(n);

        for (c, info) in input.components.iter().enumerate() {
            let (cx0, cy0, cx1, cy1) = component_bounds(tx0, ty0, tx1, ty1, info.dx, info.dy);
            let full_w = ceil_div(input.width as i64, info.dx.max(1) as i64) as u32;
            let (w, h) = (cx1 - cx0, cy1 - cy0);
            let mut buf = vec![0i32; (w * h) as usize];
            for y in 0..h {
                let src_start = ((cy0 + y) * full_w + cx0) as usize;
                let dst_start = (y * w) as usize;
                buf[dst_start..dst_start + w as usize]
                    .copy_from_slice(&input.samples[c][src_start..src_start + w as usize]);
            }
            for v in buf.iter_mut() {
                *v = level_shift_forward(*v, info.depth, info.is_signed);
            }
            tile_samples.push(buf);
            comp_dims.push((cx0, cy0, w, h));
        }

        if self.options.mct && n >= 3 {
            let (first, rest) = tile_samples.split_at_mut(1);
            let (second, third) = rest.split_at_mut(1);
            if self.options.lossless {
                mct::forward_rct(&mut first[0], &mut second[0], &mut third[0]);
            } else {
                let (y, cb, cr) = mct::forward_ict(&first[0], &second[0], &third[0]);
                first[0] = y.iter().map(|v| v.round() as i32).collect();
                second[0] = cb.iter().map(|v| v.round() as i32).collect();
                third[0] = cr.iter().map(|v| v.round() as i32).collect();
            }
        }
        for binding in &self.options.mct_bindings {
            mct::apply_mcx_forward(&mut tile_samples, binding);
        }

        let mut resolutions_per_component: Vec<Vec<J2kResolution>> = Vec::with_capacity(n);
        for (c, info) in input.components.iter().enumerate() {
            let (cx0, cy0, w, h) = comp_dims[c];
            resolutions_per_component.push(self.decompose_component(&tile_samples[c], w, h, cx0, cy0, info.depth));
        }

        // Tier-1: entropy code every code-block, recording a
        // (component, resolution, subband, block) -> rate-control-index map
        // so the chosen layer schedule can be routed back to each block.
        let mut blocks_for_rc: Vec<CodeBlockPasses> = Vec::new();
        let mut schedule_index: HashMap<(usize, usize, usize, usize), usize> = HashMap::new();
        let mut raw: Vec<Vec<Vec<Vec<EncodedBlock>>>> = Vec::with_capacity(n);

        let levels = self.options.num_levels;
        for (c, resolutions) in resolutions_per_component.iter().enumerate() {
            let mut per_resolution = Vec::with_capacity(resolutions.len());
            for (r, resolution) in resolutions.iter().enumerate() {
                let mut per_subband = Vec::with_capacity(resolution.subbands.len());
                for (s, subband) in resolution.subbands.iter().enumerate() {
                    let blocks = self.encode_subband_blocks(subband, roi_mask, resolution.level, levels);
                    for (b, block) in blocks.iter().enumerate() {
                        if block.has_data {
                            schedule_index.insert((c, r, s, b), blocks_for_rc.len());
                            blocks_for_rc.push(CodeBlockPasses { passes: block.passes.clone() });
                        }
                    }
                    per_subband.push(blocks);
                }
                per_resolution.push(per_subband);
            }
            raw.push(per_resolution);
        }

        let num_layers = self.options.num_layers as usize;
        let schedule = if self.options.target_ratio > 0.0 {
            let image_sample_bytes: u64 = tile_samples.iter().map(|c| c.len() as u64).sum();
            target_ratio_allocation(
                &blocks_for_rc,
                num_layers,
                image_sample_bytes,
                self.options.target_ratio,
                BudgetSchedule::EqualQuality,
                0.05,
            )
        } else {
            let total_budget: u32 = blocks_for_rc
                .iter()
                .map(|b| b.passes.iter().map(|p| p.rate).sum::<u32>())
                .sum();
            pcrd_allocation(&blocks_for_rc, num_layers, total_budget, BudgetSchedule::EqualRate, 0.05)
        };

        // Build the final J2kCodeBlock list per subband in grid order,
        // slicing each block's compressed buffer at the pass boundaries the
        // PCRD schedule assigned to each layer.
        for (c, per_resolution) in raw.iter().enumerate() {
            for (r, per_subband) in per_resolution.iter().enumerate() {
                for (s, blocks) in per_subband.iter().enumerate() {
                    let subband = &mut resolutions_per_component[c][r].subbands[s];
                    for (b, block) in blocks.iter().enumerate() {
                        let mut layer_data = vec![Vec::new(); num_layers];
                        let mut pass_lengths_by_layer = vec![Vec::new(); num_layers];
                        let total_passes = if block.has_data {
                            let idx = schedule_index[&(c, r, s, b)];
                            let mut prev_passes = 0u32;
                            let mut prev_bytes = 0u32;
                            for l in 0..num_layers {
                                let cumulative_passes = schedule[idx][l];
                                if cumulative_passes > prev_passes {
                                    let cumulative = cumulative_bytes(&block.passes, cumulative_passes);
                                    layer_data[l] = block.compressed[prev_bytes as usize..cumulative as usize].to_vec();
                                    pass_lengths_by_layer[l] = block.passes[prev_passes as usize..cumulative_passes as usize]
                                        .iter()
                                        .map(|p| p.rate)
                                        .collect();
                                    prev_bytes = cumulative;
                                    prev_passes = cumulative_passes;
                                }
                            }
                            prev_passes as u8
                        } else {
                            0
                        };
                        subband.codeblocks.push(J2kCodeBlock {
                            x0: block.x0,
                            y0: block.y0,
                            width: block.width,
                            height: block.height,
                            layer_data,
                            pass_lengths_by_layer,
                            layers_decoded: 0,
                            zero_bit_planes: block.zero_bp,
                            total_passes,
                            seen: false,
                        });
                    }
                }
            }
        }

        self.assemble_packets(&resolutions_per_component, n)
    }

    /// Decomposes one tile-component's level-shifted/MCT'd samples into its
    /// full resolution/subband tree (Annex F multi-level DWT plus Annex E
    /// scalar quantization); resolution 0 holds only the LL band.
    fn decompose_component(&self, data: &[i32], w: u32, h: u32, x0: u32, y0: u32, depth: u8) -> Vec<J2kResolution> {
        let levels = self.options.num_levels;
        let mut resolutions: Vec<J2kResolution> = (0..=levels)
            .map(|l| J2kResolution { level: l, width: 0, height: 0, subbands: Vec::new() })
            .collect();

        let (mut cur_w, mut cur_h, mut cur_x0, mut cur_y0) = (w, h, x0, y0);
        let mut cur_i = data.to_vec();
        let mut cur_f: Vec<f32> = if self.options.lossless {
            Vec::new()
        } else {
            cur_i.iter().map(|&v| v as f32).collect()
        };

        for level in (1..=levels).rev() {
            let low_w = cur_w.div_ceil(2);
            let high_w = cur_w / 2;
            let low_h = cur_h.div_ceil(2);
            let high_h = cur_h / 2;

            if self.options.lossless {
                let (ll, hl, lh, hh) = Dwt53::forward_2d(&cur_i, cur_w, cur_h, cur_x0, cur_y0);
                resolutions[level as usize].width = cur_w;
                resolutions[level as usize].height = cur_h;
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_i32(SubbandOrientation::HL, high_w, low_h, depth, hl));
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_i32(SubbandOrientation::LH, low_w, high_h, depth, lh));
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_i32(SubbandOrientation::HH, high_w, high_h, depth, hh));
                cur_i = ll;
            } else {
                let (ll, hl, lh, hh) = Dwt97::forward_2d(&cur_f, cur_w, cur_h, cur_x0, cur_y0);
                resolutions[level as usize].width = cur_w;
                resolutions[level as usize].height = cur_h;
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_f32(SubbandOrientation::HL, high_w, low_h, depth, &hl));
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_f32(SubbandOrientation::LH, low_w, high_h, depth, &lh));
                resolutions[level as usize]
                    .subbands
                    .push(self.make_subband_f32(SubbandOrientation::HH, high_w, high_h, depth, &hh));
                cur_f = ll;
            }
            cur_w = low_w;
            cur_h = low_h;
            cur_x0 = ceil_div(cur_x0 as i64, 2) as u32;
            cur_y0 = ceil_div(cur_y0 as i64, 2) as u32;
        }

        resolutions[0].width = cur_w;
        resolutions[0].height = cur_h;
        let ll_subband = if self.options.lossless {
            self.make_subband_i32(SubbandOrientation::LL, cur_w, cur_h, depth, cur_i)
        } else {
            self.make_subband_f32(SubbandOrientation::LL, cur_w, cur_h, depth, &cur_f)
        };
        resolutions[0].subbands.push(ll_subband);

        resolutions
    }

    fn gain_bits(orientation: SubbandOrientation) -> u8 {
        match orientation {
            SubbandOrientation::LL => 0,
            SubbandOrientation::HL | SubbandOrientation::LH => 1,
            SubbandOrientation::HH => 2,
        }
    }

    fn make_subband_i32(&self, orientation: SubbandOrientation, w: u32, h: u32, depth: u8, data: Vec<i32>) -> J2kSubband {
        let exponent = subband_range_bits(depth, Self::gain_bits(orientation));
        J2kSubband {
            orientation,
            x0: 0,
            y0: 0,
            width: w,
            height: h,
            exponent,
            mantissa: 0,
            codeblock_width: self.options.code_block_w,
            codeblock_height: self.options.code_block_h,
            codeblocks: Vec::new(),
            data: data.into_iter().map(quantize_reversible).collect(),
        }
    }

    fn make_subband_f32(&self, orientation: SubbandOrientation, w: u32, h: u32, depth: u8, data: &[f32]) -> J2kSubband {
        let range_bits = subband_range_bits(depth, Self::gain_bits(orientation));
        let exponent = self.derive_exponent(range_bits);
        let step = step_size(range_bits, exponent, 0);
        J2kSubband {
            orientation,
            x0: 0,
            y0: 0,
            width: w,
            height: h,
            exponent,
            mantissa: 0,
            codeblock_width: self.options.code_block_w,
            codeblock_height: self.options.code_block_h,
            codeblocks: Vec::new(),
            data: data.iter().map(|&v| quantize_scalar(v, step)).collect(),
        }
    }

    /// Maps `quality` (1..=100) onto a step-size exponent: 100 keeps nearly
    /// all bit planes (step 1), 1 keeps only the top bit plane.
    fn derive_exponent(&self, range_bits: u8) -> u8 {
        let reduction = ((100 - self.options.quality as u32) * (range_bits.saturating_sub(1)) as u32) / 100;
        range_bits.saturating_sub(reduction as u8).max(1)
    }

    fn encode_subband_blocks(
        &self,
        subband: &J2kSubband,
        roi_mask: Option<&RoiMask>,
        level: u8,
        levels: u8,
    ) -> Vec<EncodedBlock> {
        let (gw, gh) = codeblock_grid(subband.width, subband.height, subband.codeblock_width, subband.codeblock_height);
        let mb = GUARD_BITS.saturating_add(subband.exponent).saturating_sub(1);
        let mut out = Vec::with_capacity((gw * gh) as usize);
        let mut coder = block_coder_for(false);

        for gy in 0..gh {
            for gx in 0..gw {
                let bx0 = gx * subband.codeblock_width;
                let by0 = gy * subband.codeblock_height;
                let bw = subband.codeblock_width.min(subband.width - bx0);
                let bh = subband.codeblock_height.min(subband.height - by0);
                let mut coeffs = vec![0i32; (bw * bh) as usize];
                for y in 0..bh {
                    let src = ((by0 + y) * subband.width + bx0) as usize;
                    let dst = (y * bw) as usize;
                    coeffs[dst..dst + bw as usize].copy_from_slice(&subband.data[src..src + bw as usize]);
                }

                if let Some(mask) = roi_mask {
                    let (fx0, fy0, fx1, fy1) =
                        super::roi::mapped_bounds(subband.x0 + bx0, subband.y0 + by0, bw, bh, level, levels, subband.orientation);
                    if mask.intersects(fx0, fy0, fx1, fy1) {
                        super::roi::apply_forward_mapped(
                            &mut coeffs,
                            bw,
                            bh,
                            subband.x0 + bx0,
                            subband.y0 + by0,
                            level,
                            levels,
                            subband.orientation,
                            mask,
                        );
                    }
                }

                let max_abs = coeffs.iter().map(|&v| v.unsigned_abs()).max().unwrap_or(0);
                let zero_bp = if max_abs == 0 {
                    mb
                } else {
                    let used = 32 - max_abs.leading_zeros();
                    mb.saturating_sub(used as u8)
                };
                let has_data = zero_bp < mb;
                let (compressed, passes) = if has_data {
                    let max_bit_plane = mb.saturating_sub(1).saturating_sub(zero_bp);
                    coder.encode_block(&coeffs, bw, bh, subband.orientation, max_bit_plane)
                } else {
                    (Vec::new(), Vec::new())
                };

                out.push(EncodedBlock {
                    x0: subband.x0 + bx0,
                    y0: subband.y0 + by0,
                    width: bw,
                    height: bh,
                    compressed,
                    passes,
                    zero_bp,
                    has_data,
                });
            }
        }
        out
    }

    /// Tier-2: assembles every packet of a tile in the configured
    /// progression order. A "logical packet" `(layer, resolution, component,
    /// precinct)` becomes one header/body per subband in that
    /// resolution/component (1 for resolution 0's LL, 3 for HL/LH/HH
    /// otherwise), since `PacketHeader` models a single flat code-block
    /// grid rather than a multi-subband precinct.
    fn assemble_packets(&self, resolutions: &[Vec<J2kResolution>], num_components: usize) -> Result<Vec<u8>, J2kError> {
        let num_resolutions = self.options.num_levels + 1;
        let num_layers = self.options.num_layers as u32;

        let order = packet_order(
            self.options.progression_order,
            num_layers,
            num_resolutions,
            num_components as u32,
            |_r, _c| 1,
        );

        let mut states: HashMap<(u8, u32, usize), PrecinctState> = HashMap::new();
        let mut body = Vec::new();
        let mut header_bits = J2kBitWriter::new();

        for id in &order {
            let resolution = &resolutions[id.component as usize][id.resolution as usize];
            for (s, subband) in resolution.subbands.iter().enumerate() {
                let (gw, gh) =
                    codeblock_grid(subband.width, subband.height, subband.codeblock_width, subband.codeblock_height);
                let state = states
                    .entry((id.resolution, id.component, s))
                    .or_insert_with(|| PrecinctState::new(gw as usize, gh as usize));

                let mut included = Vec::new();
                for (idx, cb) in subband.codeblocks.iter().enumerate() {
                    let gx = idx % gw as usize;
                    let gy = idx / gw as usize;
                    let layer_bytes = &cb.layer_data[id.layer as usize];
                    if layer_bytes.is_empty() {
                        continue;
                    }
                    let newly_included = cb.layer_data[..id.layer as usize].iter().all(|b| b.is_empty());
                    let pass_lengths = cb.pass_lengths_by_layer[id.layer as usize].clone();
                    included.push(CodeBlockInfo {
                        x: gx,
                        y: gy,
                        newly_included,
                        num_passes: pass_lengths.len() as u32,
                        pass_lengths,
                        data_len: layer_bytes.len() as u32,
                        zero_bp: cb.zero_bit_planes,
                    });
                }

                let header = PacketHeader {
                    layer_index: id.layer,
                    empty: included.is_empty(),
                    included_cblks: included.clone(),
                };
                header.write(&mut header_bits, state, gw as usize, gh as usize);

                for cb_info in &included {
                    let idx = cb_info.y * gw as usize + cb_info.x;
                    body.extend_from_slice(&subband.codeblocks[idx].layer_data[id.layer as usize]);
                }
            }
        }

        let mut out = header_bits.finish();
        out.extend_from_slice(&body);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EncoderOptions, ProgressionOrder};

    fn gradient_input(w: u32, h: u32) -> Vec<i32> {
        (0..w * h).map(|i| (i % 256) as i32).collect()
    }

    #[test]
    fn encodes_a_small_grayscale_image_with_valid_framing() {
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
        let samples = gradient_input(32, 32);
        let input = EncodeInput {
            width: 32,
            height: 32,
            components: vec![J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }],
            samples: &[samples],
        };
        let bytes = encoder.encode(&input).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0x4F]);
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0x51]));
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0x52]));
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0xD9]));
    }

    #[test]
    fn multi_layer_lossy_encode_produces_nonempty_stream() {
        let options = EncoderOptions {
            num_levels: 2,
            lossless: false,
            code_block_w: 16,
            code_block_h: 16,
            num_layers: 3,
            quality: 60,
            mct: false,
            ..Default::default()
        };
        let encoder = J2kEncoder::new(options).unwrap();
        let samples = gradient_input(32, 32);
        let input = EncodeInput {
            width: 32,
            height: 32,
            components: vec![J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }],
            samples: &[samples],
        };
        let bytes = encoder.encode(&input).unwrap();
        assert!(bytes.len() > 20);
    }

    #[test]
    fn rgb_input_applies_mct_without_error() {
        let options = EncoderOptions {
            num_levels: 1,
            lossless: true,
            code_block_w: 16,
            code_block_h: 16,
            num_layers: 1,
            ..Default::default()
        };
        let encoder = J2kEncoder::new(options).unwrap();
        let r = gradient_input(16, 16);
        let g = gradient_input(16, 16);
        let b = gradient_input(16, 16);
        let input = EncodeInput {
            width: 16,
            height: 16,
            components: vec![J2kComponentInfo { depth: 8, is_signed: false, dx: 1, dy: 1 }; 3],
            samples: &[r, g, b],
        };
        assert!(encoder.encode(&input).is_ok());
    }

    #[test]
    fn progression_order_is_carried_into_cod() {
        let options = EncoderOptions { progression_order: ProgressionOrder::Rlcp, ..Default::default() };
        let encoder = J2kEncoder::new(options).unwrap();
        let cod = encoder.build_cod();
        assert_eq!(cod.progression_order, ProgressionOrder::Rlcp.to_wire());
    }
}
