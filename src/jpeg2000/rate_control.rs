//! Tier-2 layer (rate-distortion) allocation (ISO/IEC 15444-1 Annex J/spec.md
//! §4.4): turns each code-block's per-pass `(Δrate, Δdistortion)` sequence
//! into a monotonically increasing per-layer pass-count schedule.

use log::debug;

/// One coding pass's contribution: bytes it costs, and the distortion
/// (weighted squared-error) it removes relative to not including it.
#[derive(Debug, Clone, Copy)]
pub struct PassInfo {
    pub rate: u32,
    pub distortion_reduction: f64,
}

/// A code-block's ordered coding passes, as produced by T1.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockPasses {
    pub passes: Vec<PassInfo>,
}

impl CodeBlockPasses {
    pub fn total_passes(&self) -> u32 {
        self.passes.len() as u32
    }

    fn cumulative_rate(&self, up_to: u32) -> u32 {
        self.passes[..up_to as usize].iter().map(|p| p.rate).sum()
    }

    fn cumulative_distortion(&self, up_to: u32) -> f64 {
        self.passes[..up_to as usize]
            .iter()
            .map(|p| p.distortion_reduction)
            .sum()
    }
}

/// Budget schedule across layers (spec.md §4.4 PCRD strategies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetSchedule {
    EqualRate,
    EqualQuality,
    Exponential,
    Adaptive,
}

impl BudgetSchedule {
    fn exponent(self) -> f64 {
        match self {
            BudgetSchedule::EqualRate => 1.0,
            BudgetSchedule::EqualQuality => 0.9,
            BudgetSchedule::Exponential => 1.1,
            BudgetSchedule::Adaptive => 1.05,
        }
    }

    /// Fraction of the total budget allotted to the cumulative byte count of
    /// layer `l` (0-based) out of `num_layers`.
    fn cumulative_fraction(self, l: usize, num_layers: usize) -> f64 {
        ((l + 1) as f64 / num_layers as f64).powf(self.exponent())
    }
}

/// `layer_pass_counts[block_index][layer_index]` = cumulative number of
/// passes of that block included by the end of that layer.
pub type LayerSchedule = Vec<Vec<u32>>;

/// Simple geometric distribution: layer `l` receives
/// `ceil(totalPasses * ((l+1)/L)^0.7)` passes, clamped monotonic and to the
/// block's total.
pub fn simple_allocation(blocks: &[CodeBlockPasses], num_layers: usize) -> LayerSchedule {
    let num_layers = num_layers.max(1);
    blocks
        .iter()
        .map(|block| {
            let total = block.total_passes();
            let mut schedule = Vec::with_capacity(num_layers);
            let mut prev = 0u32;
            for l in 0..num_layers {
                let frac = ((l + 1) as f64 / num_layers as f64).powf(0.7);
                let mut passes = (total as f64 * frac).ceil() as u32;
                passes = passes.clamp(prev, total);
                schedule.push(passes);
                prev = passes;
            }
            if let Some(last) = schedule.last_mut() {
                *last = total;
            }
            schedule
        })
        .collect()
}

/// For a target `budget` (bytes) and a fixed `lambda`, returns for each block
/// the number of passes whose cumulative inclusion is justified: the largest
/// pass index `p` such that every pass `0..=p` lies on the upper convex hull
/// of (rate, distortion) with incremental slope `>= lambda`, always
/// including at least pass 0 if the block has any passes (Open Question
/// (iii): a requested budget must never starve a block that has data).
fn truncation_point(block: &CodeBlockPasses, lambda: f64) -> u32 {
    let total = block.total_passes();
    if total == 0 {
        return 0;
    }
    let mut included = 1u32;
    let mut prev_rate = block.cumulative_rate(1);
    let mut prev_distortion = block.cumulative_distortion(1);
    for p in 2..=total {
        let rate = block.cumulative_rate(p);
        let distortion = block.cumulative_distortion(p);
        let delta_rate = (rate - prev_rate).max(1) as f64;
        let delta_distortion = distortion - prev_distortion;
        let slope = delta_distortion / delta_rate;
        if slope >= lambda {
            included = p;
            prev_rate = rate;
            prev_distortion = distortion;
        } else {
            break;
        }
    }
    included
}

/// Binary-searches `lambda` so the sum of truncated rates across all blocks
/// lands within `tolerance` (fraction, e.g. 0.01) of `budget` bytes.
fn lambda_search(blocks: &[CodeBlockPasses], budget: u32, tolerance: f64) -> f64 {
    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    // Grow hi until it's restrictive enough to fit the budget (or we give up
    // after a bounded number of doublings).
    for _ in 0..32 {
        let rate: u32 = blocks
            .iter()
            .map(|b| b.cumulative_rate(truncation_point(b, hi)))
            .sum();
        if rate <= budget {
            break;
        }
        hi *= 2.0;
    }
    let target = budget as f64;
    for _ in 0..40 {
        let mid = (lo + hi) / 2.0;
        let rate: u32 = blocks
            .iter()
            .map(|b| b.cumulative_rate(truncation_point(b, mid)))
            .sum();
        let rate = rate as f64;
        if (rate - target).abs() <= target * tolerance {
            return mid;
        }
        if rate > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Post-Compression Rate-Distortion allocation: each layer gets a cumulative
/// byte budget from `schedule`, and within that budget every block is
/// truncated at the pass whose incremental distortion/rate slope crosses a
/// Lagrangian threshold found by [`lambda_search`].
pub fn pcrd_allocation(
    blocks: &[CodeBlockPasses],
    num_layers: usize,
    total_budget: u32,
    schedule: BudgetSchedule,
    tolerance: f64,
) -> LayerSchedule {
    let num_layers = num_layers.max(1);
    let mut result: LayerSchedule = blocks.iter().map(|_| vec![0u32; num_layers]).collect();
    let mut prev_cumulative = vec![0u32; blocks.len()];

    for l in 0..num_layers {
        let frac = schedule.cumulative_fraction(l, num_layers);
        let layer_budget = (total_budget as f64 * frac).round() as u32;
        let lambda = lambda_search(blocks, layer_budget, tolerance);
        for (i, block) in blocks.iter().enumerate() {
            let passes = truncation_point(block, lambda).max(prev_cumulative[i]);
            result[i][l] = passes;
            prev_cumulative[i] = passes;
        }
        debug!(
            "rate control layer {l}: budget={layer_budget} lambda={lambda:.6} blocks={}",
            blocks.len()
        );
    }

    enforce_monotonic_to_total(&mut result, blocks);
    result
}

/// `TargetRatio`: final-layer budget is `image_sample_bytes / ratio`, then
/// standard PCRD fills the layers below it.
pub fn target_ratio_allocation(
    blocks: &[CodeBlockPasses],
    num_layers: usize,
    image_sample_bytes: u64,
    ratio: f64,
    schedule: BudgetSchedule,
    tolerance: f64,
) -> LayerSchedule {
    let budget = if ratio > 0.0 {
        (image_sample_bytes as f64 / ratio).round() as u32
    } else {
        blocks.iter().map(|b| b.cumulative_rate(b.total_passes())).sum()
    };
    pcrd_allocation(blocks, num_layers, budget, schedule, tolerance)
}

/// Final layer always includes every coded pass, and every later layer is
/// clamped to be no less than the previous one (defensive against a
/// rounding quirk in the budget schedule producing a dip).
fn enforce_monotonic_to_total(schedule: &mut LayerSchedule, blocks: &[CodeBlockPasses]) {
    for (i, block) in blocks.iter().enumerate() {
        let total = block.total_passes();
        let mut prev = 0u32;
        for l in schedule[i].iter_mut() {
            *l = (*l).max(prev);
            prev = *l;
        }
        if let Some(last) = schedule[i].last_mut() {
            *last = total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(n: u32) -> CodeBlockPasses {
        CodeBlockPasses {
            passes: (0..n)
                .map(|i| PassInfo {
                    rate: 10,
                    distortion_reduction: 100.0 / (i as f64 + 1.0),
                })
                .collect(),
        }
    }

    #[test]
    fn simple_allocation_is_monotonic_and_reaches_total() {
        let blocks = vec![sample_block(10), sample_block(6)];
        let schedule = simple_allocation(&blocks, 4);
        for (i, layers) in schedule.iter().enumerate() {
            let mut prev = 0;
            for &p in layers {
                assert!(p >= prev);
                prev = p;
            }
            assert_eq!(*layers.last().unwrap(), blocks[i].total_passes());
        }
    }

    #[test]
    fn pcrd_never_starves_a_block_with_data() {
        let blocks = vec![sample_block(8)];
        let schedule = pcrd_allocation(&blocks, 2, 1, BudgetSchedule::EqualQuality, 0.1);
        assert!(schedule[0][0] >= 1, "cheapest inclusion point must survive a tiny budget");
    }

    #[test]
    fn pcrd_respects_budget_tolerance_for_generous_budgets() {
        let blocks = vec![sample_block(10), sample_block(10)];
        let total: u32 = blocks[0].cumulative_rate(10) + blocks[1].cumulative_rate(10);
        let schedule = pcrd_allocation(&blocks, 1, total, BudgetSchedule::EqualRate, 0.01);
        assert_eq!(schedule[0][0], 10);
        assert_eq!(schedule[1][0], 10);
    }

    #[test]
    fn target_ratio_scales_budget_by_ratio() {
        let blocks = vec![sample_block(10)];
        let schedule = target_ratio_allocation(&blocks, 1, 1000, 10.0, BudgetSchedule::EqualQuality, 0.05);
        assert!(schedule[0][0] <= 10);
    }
}
