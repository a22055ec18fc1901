//! Weighted deficit split using the largest-remainder (Hamilton) method.
//!
//! Works purely in integer minor units: every share is `deficit * weight /
//! total_weight` computed exactly, floored, and the leftover units go to the
//! largest fractional remainders. Because all shares have the same
//! denominator, remainders compare exactly as integers.

/// One candidate source for an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedSource {
    /// Source budget id, used only to identify the output slot
    pub source_budget_id: i64,
    /// Relative weight; zero or negative never receives anything
    pub weight: i32,
}

/// Splits `deficit` (in cents) across `sources` in proportion to their weights.
///
/// The result is aligned with `sources`. It always sums to `deficit` when at
/// least one weight is positive and `deficit > 0`; otherwise every slot is 0.
/// Ties between equal remainders go to the source that appears first, so
/// callers must pass sources in a stable order (ascending source id).
#[must_use]
pub fn allocate(deficit: i64, sources: &[WeightedSource]) -> Vec<i64> {
    let mut allocations = vec![0_i64; sources.len()];
    if deficit <= 0 {
        return allocations;
    }

    let total_weight: i128 = sources
        .iter()
        .filter(|s| s.weight > 0)
        .map(|s| i128::from(s.weight))
        .sum();
    if total_weight <= 0 {
        return allocations;
    }

    let deficit_wide = i128::from(deficit);
    let mut allocated: i128 = 0;
    // (index, remainder numerator over total_weight)
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(sources.len());
    for (idx, source) in sources.iter().enumerate() {
        if source.weight <= 0 {
            continue;
        }
        let exact = deficit_wide * i128::from(source.weight);
        let base = exact / total_weight;
        allocations[idx] = narrow(base);
        allocated += base;
        remainders.push((idx, exact % total_weight));
    }

    // Stable sort keeps input order among equal remainders.
    remainders.sort_by(|a, b| b.1.cmp(&a.1));

    let leftover = usize::try_from(deficit_wide - allocated).unwrap_or(0);
    debug_assert!(leftover < remainders.len().max(1));
    for (idx, _) in remainders.iter().take(leftover) {
        allocations[*idx] += 1;
    }

    allocations
}

// Every base share is at most `deficit`, which came from an i64.
fn narrow(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
