//! Parameter-slot → asset assignments.
//!
//! `generate(k, n)` enumerates all `n^k` assignments of `n` assets to `k`
//! parameter slots, repeats included, as a base-`n` odometer: the **last**
//! slot turns fastest. For `k = 2, n = 2` the order is
//! `[0,0] [0,1] [1,0] [1,1]`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{AssetId, ParamSlot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermutationError {
    #[error("cannot bind parameters over an empty asset list")]
    NoAssets,
    #[error("{assets}^{params} assignments overflow the addressable range")]
    TooLarge { params: usize, assets: usize },
}

/// One concrete assignment: position `i` holds the asset bound to slot `i`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(Vec<AssetId>);

impl Assignment {
    pub fn new(assets: Vec<AssetId>) -> Self {
        Self(assets)
    }

    /// Asset bound to `slot`.
    ///
    /// Callers validate slots against the exploit's parameter count when the
    /// exploit is built, so an out-of-range slot is a programming error.
    pub fn asset(&self, slot: ParamSlot) -> AssetId {
        self.0[slot.index()]
    }

    pub fn get(&self, slot: ParamSlot) -> Option<AssetId> {
        self.0.get(slot.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(slot, asset)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamSlot, AssetId)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &asset)| (ParamSlot::new(i as u32), asset))
    }

    pub fn as_slice(&self) -> &[AssetId] {
        &self.0
    }
}

/// Enumerate every assignment of `assets` assets to `params` slots.
pub fn generate(params: usize, assets: usize) -> Result<Vec<Assignment>, PermutationError> {
    if assets == 0 {
        return Err(PermutationError::NoAssets);
    }
    let total = u32::try_from(params)
        .ok()
        .and_then(|k| assets.checked_pow(k))
        .filter(|total| total.checked_mul(params.max(1)).is_some())
        .ok_or(PermutationError::TooLarge { params, assets })?;

    let mut out = Vec::with_capacity(total);
    let mut digits = vec![0u32; params];
    for _ in 0..total {
        out.push(Assignment(digits.iter().map(|&d| AssetId::new(d)).collect()));

        // Advance the odometer, last slot first.
        for digit in digits.iter_mut().rev() {
            *digit += 1;
            if (*digit as usize) < assets {
                break;
            }
            *digit = 0;
        }
    }
    Ok(out)
}

/// Assignment sets keyed by parameter count; the asset count is fixed for a run.
#[derive(Debug, Clone)]
pub struct PermutationCache {
    assets: usize,
    sets: AHashMap<usize, Arc<[Assignment]>>,
}

impl PermutationCache {
    pub fn new(assets: usize) -> Self {
        Self {
            assets,
            sets: AHashMap::new(),
        }
    }

    pub fn assets(&self) -> usize {
        self.assets
    }

    /// Assignments for `params` slots, computed on first request.
    pub fn get(&mut self, params: usize) -> Result<Arc<[Assignment]>, PermutationError> {
        if let Some(set) = self.sets.get(&params) {
            return Ok(Arc::clone(set));
        }
        let set: Arc<[Assignment]> = generate(params, self.assets)?.into();
        self.sets.insert(params, Arc::clone(&set));
        Ok(set)
    }

    /// Number of distinct parameter counts computed so far.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
