//! Merge kernel for partial attention states.
//!
//! Given two partial results `(o_p, lse_p)` and `(o_s, lse_s)` computed over
//! disjoint key ranges, the attention over the union is
//!
//! ```text
//! m     = max(lse_p, lse_s)
//! w_p   = exp(lse_p - m),  w_s = exp(lse_s - m)
//! o     = o_p * w_p / (w_p + w_s) + o_s * w_s / (w_p + w_s)
//! lse   = ln(w_p + w_s) + m
//! ```
//!
//! The launch is a 1-D grid. Each worker owns one pack (16 bytes) of one
//! `(token, head)` row. Every worker recomputes the two scale factors for
//! its row from the LSE inputs; only the worker holding pack 0 emits the
//! merged LSE. Blocks map to disjoint chunks of the output, so there is no
//! synchronization between workers.

use attnmerge::dtype::{FloatStorage, TRANSFER_BYTES};
use attnmerge::launch::{LaunchConfig, WorkItem};
use attnmerge::merge::MergeGeometry;
use rayon::prelude::*;

/// Widest pack over all supported storage types (2-byte elements).
const MAX_PACK: usize = TRANSFER_BYTES / 2;

/// Per-row recombination factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeScales {
    pub prefix_scale: f32,
    pub suffix_scale: f32,
    pub lse: f32,
}

/// Infinite LSEs of either sign mean "contributes nothing".
///
/// `+inf` is folded to `-inf` too, so such a row drops out of the merge.
#[inline]
#[must_use]
pub fn canonicalize_lse(lse: f32) -> f32 {
    if lse.is_infinite() {
        f32::NEG_INFINITY
    } else {
        lse
    }
}

/// Stabilised scale factors for one `(token, head)` row.
///
/// Both inputs at `-inf` yields NaN scales and a NaN LSE.
#[inline]
#[must_use]
pub fn merge_scales(prefix_lse: f32, suffix_lse: f32) -> MergeScales {
    let p_lse = canonicalize_lse(prefix_lse);
    let s_lse = canonicalize_lse(suffix_lse);
    let max_lse = p_lse.max(s_lse);

    let p_se = (p_lse - max_lse).exp();
    let s_se = (s_lse - max_lse).exp();
    let out_se = p_se + s_se;

    MergeScales {
        prefix_scale: p_se / out_se,
        suffix_scale: s_se / out_se,
        lse: out_se.ln() + max_lse,
    }
}

/// Load one pack into f32 registers.
#[inline]
fn load_pack<T: FloatStorage>(src: &[T]) -> [f32; MAX_PACK] {
    let mut regs = [0.0f32; MAX_PACK];
    for (r, v) in regs.iter_mut().zip(&src[..T::PACK_WIDTH]) {
        *r = v.to_f32();
    }
    regs
}

/// Narrow f32 registers and store them as one pack.
#[inline]
fn store_pack<T: FloatStorage>(regs: &[f32; MAX_PACK], dst: &mut [T]) {
    let mut pack = [T::default(); MAX_PACK];
    for (p, &r) in pack.iter_mut().zip(regs) {
        *p = T::from_f32(r);
    }
    dst[..T::PACK_WIDTH].copy_from_slice(&pack[..T::PACK_WIDTH]);
}

/// Weighted sum of two packs: `out = fma(p, p_scale, s * s_scale)`.
#[inline]
pub fn merge_pack<T: FloatStorage>(
    prefix: &[T],
    suffix: &[T],
    scales: &MergeScales,
    out: &mut [T],
) {
    let p = load_pack(prefix);
    let s = load_pack(suffix);
    let mut o = [0.0f32; MAX_PACK];
    for ((dst, p), s) in o.iter_mut().zip(p).zip(s).take(T::PACK_WIDTH) {
        *dst = p.mul_add(scales.prefix_scale, s * scales.suffix_scale);
    }
    store_pack(&o, out);
}

/// Read-only inputs of one launch.
#[derive(Clone, Copy)]
pub struct MergeInputs<'a, T> {
    pub prefix_output: &'a [T],
    pub prefix_lse: &'a [f32],
    pub suffix_output: &'a [T],
    pub suffix_lse: &'a [f32],
}

/// Body of one worker. Writes its pack and returns the merged LSE if it
/// owns pack 0 of its row.
#[inline]
fn merge_worker<T: FloatStorage>(
    item: WorkItem,
    geom: &MergeGeometry,
    inputs: &MergeInputs<'_, T>,
    out_pack: &mut [T],
) -> Option<f32> {
    let row = item.lse_index(geom.heads);
    let scales = merge_scales(inputs.prefix_lse[row], inputs.suffix_lse[row]);

    let off = item.element_offset(geom.heads, geom.head_dim, T::PACK_WIDTH);
    let end = off + T::PACK_WIDTH;
    merge_pack(
        &inputs.prefix_output[off..end],
        &inputs.suffix_output[off..end],
        &scales,
        out_pack,
    );

    (item.pack == 0).then_some(scales.lse)
}

/// Split the merged LSE buffer into one chunk per block.
///
/// Block `b` receives the rows whose pack-0 worker falls inside
/// `cfg.block_range(b)`.
fn split_lse_by_block<'a>(
    lse: Option<&'a mut [f32]>,
    geom: &MergeGeometry,
    cfg: &LaunchConfig,
) -> Vec<Option<&'a mut [f32]>> {
    let Some(mut rest) = lse else {
        return (0..cfg.grid_dim).map(|_| None).collect();
    };
    let total = geom.total_work();
    let packs_per_head = geom.packs_per_head();
    let mut parts = Vec::with_capacity(cfg.grid_dim);
    let mut consumed = 0;
    for block in 0..cfg.grid_dim {
        let end = cfg.block_range(block).end.min(total).div_ceil(packs_per_head);
        let remaining: &'a mut [f32] = std::mem::take(&mut rest);
        let (chunk, tail) = remaining.split_at_mut(end - consumed);
        parts.push(Some(chunk));
        rest = tail;
        consumed = end;
    }
    parts
}

fn run_block<T: FloatStorage>(
    block: usize,
    cfg: &LaunchConfig,
    geom: &MergeGeometry,
    inputs: &MergeInputs<'_, T>,
    out_block: &mut [T],
    mut lse_block: Option<&mut [f32]>,
) {
    let range = cfg.block_range(block);
    let lse_base = range.start.div_ceil(geom.packs_per_head());
    for (lane, idx) in range.enumerate() {
        let Some(item) = geom.work_item(idx) else {
            return;
        };
        let out_pack = &mut out_block[lane * T::PACK_WIDTH..(lane + 1) * T::PACK_WIDTH];
        let lse = merge_worker(item, geom, inputs, out_pack);
        if let (Some(lse), Some(dst)) = (lse, lse_block.as_deref_mut()) {
            dst[item.lse_index(geom.heads) - lse_base] = lse;
        }
    }
}

/// Launch the merge over the whole grid.
///
/// Must be called on validated geometry: `T::PACK_WIDTH == geom.pack_width()`
/// and all buffers sized to match. Each block runs as one Rayon task.
pub fn merge_attn_states<T: FloatStorage>(
    geom: &MergeGeometry,
    cfg: &LaunchConfig,
    inputs: &MergeInputs<'_, T>,
    output: &mut [T],
    output_lse: Option<&mut [f32]>,
) {
    debug_assert_eq!(T::PACK_WIDTH, geom.pack_width());
    debug_assert_eq!(output.len(), geom.total_work() * T::PACK_WIDTH);
    if cfg.grid_dim == 0 {
        return;
    }

    let lse_blocks = split_lse_by_block(output_lse, geom, cfg);
    output
        .par_chunks_mut(cfg.block_dim * T::PACK_WIDTH)
        .zip(lse_blocks.into_par_iter())
        .enumerate()
        .for_each(|(block, (out_block, lse_block))| {
            run_block(block, cfg, geom, inputs, out_block, lse_block);
        });
}
