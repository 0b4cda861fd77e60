//! Randomized proportional size planning
//!
//! The plan works off a weight budget of 10 units. Each round draws a
//! weight in `[1, 10)`; while the draw fits under the remaining budget,
//! `total_bytes * weight / 10` bytes (floor) become the next chunk and the
//! budget shrinks by the weight. The first draw that does not fit takes
//! every still-unallocated byte as the final chunk. The budget strictly
//! decreases, so the loop terminates with 1 to 10 chunks whose lengths sum
//! exactly to `total_bytes`.
//!
//! Floor division means small inputs legitimately produce zero-length
//! chunks; they round-trip as empty byte ranges.

use rand::Rng;

/// Total weight units available to a single plan.
const WEIGHT_BUDGET: u32 = 10;

/// Plan chunk byte-lengths for a buffer of `total_bytes`.
///
/// Pure given the `rng`: a seeded generator reproduces the plan exactly,
/// which is what the tests rely on.
pub fn plan_sizes<R: Rng + ?Sized>(total_bytes: usize, rng: &mut R) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut remaining_weight = WEIGHT_BUDGET;
    let mut allocated = 0usize;

    loop {
        let weight = rng.gen_range(1..WEIGHT_BUDGET);
        if weight < remaining_weight {
            let len = (total_bytes as u64 * weight as u64 / WEIGHT_BUDGET as u64) as usize;
            sizes.push(len);
            allocated += len;
            remaining_weight -= weight;
        } else {
            sizes.push(total_bytes - allocated);
            break;
        }
    }

    sizes
}
