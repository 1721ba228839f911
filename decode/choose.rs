/// Number of unordered `k`-subsets of `n` items.
///
/// Iterates `min(k, n - k)` times; each partial product is itself a binomial
/// coefficient, so every division is exact. Returns `None` on overflow and `0`
/// when `k > n`.
pub fn choose(n: u32, k: u32) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for j in 1..=u128::from(k) {
        acc = acc.checked_mul(u128::from(n - k) + j)? / j;
    }
    u64::try_from(acc).ok()
}

/// Per-ploidy cache of `choose(alleles + ploidy - 1, alleles - 1)` for a single
/// allele count, filled on first use.
#[derive(Debug)]
pub(crate) struct CombinationTable {
    alleles: u32,
    by_ploidy: [Option<u64>; 64],
}

impl CombinationTable {
    pub(crate) fn new(alleles: u16) -> Self {
        Self {
            alleles: u32::from(alleles),
            by_ploidy: [None; 64],
        }
    }

    /// Distinct unphased genotypes for a sample of the given ploidy.
    pub(crate) fn genotypes(&mut self, ploidy: u8) -> Option<u64> {
        let slot = usize::from(ploidy & 0x3f);
        if let Some(n) = self.by_ploidy[slot] {
            return Some(n);
        }
        let n = choose(self.alleles + u32::from(ploidy) - 1, self.alleles - 1)?;
        self.by_ploidy[slot] = Some(n);
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_one_is_identity() {
        for n in 1..=70 {
            assert_eq!(choose(n, 1), Some(u64::from(n)));
        }
    }

    #[test]
    fn choose_is_symmetric() {
        for n in 0..=70 {
            for k in 0..=n {
                assert_eq!(choose(n, k), choose(n, n - k), "n={n} k={k}");
            }
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(choose(0, 0), Some(1));
        assert_eq!(choose(3, 1), Some(3));
        assert_eq!(choose(4, 2), Some(6));
        assert_eq!(choose(64, 32), Some(1_832_624_140_942_590_534));
        assert_eq!(choose(5, 6), Some(0));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(choose(200, 100), None);
    }

    #[test]
    fn table_matches_direct_computation() {
        let mut table = CombinationTable::new(3);
        assert_eq!(table.genotypes(2), Some(6));
        assert_eq!(table.genotypes(2), Some(6));
        assert_eq!(table.genotypes(0), Some(1));
        assert_eq!(table.genotypes(1), choose(3, 2));
    }
}
