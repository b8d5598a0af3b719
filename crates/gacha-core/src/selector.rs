//! Weighted tier selection over a cumulative weight table.
//!
//! A table is an ordered list of [`WeightedEntry`] rows whose cumulative
//! weights are positive and strictly increasing. A draw `r` is taken
//! uniformly from `[0, total)` and the first row whose cumulative weight
//! exceeds `r` wins. A draw that rounds up to the total lands on the last
//! row.
//!
//! ```text
//! raw weights   1    3        6
//! cumulative    1    4        10
//! ranges      [0,1) [1,4)   [4,10)
//! ```

use gacha_types::{RewardTier, WeightedEntry};
use rand::Rng;

/// Errors raised by weight table construction and selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// The table is empty, unsorted, or holds non-positive weights.
    #[error("invalid weight table: {reason}")]
    InvalidConfiguration {
        /// What is wrong with the table.
        reason: String,
    },
}

impl SelectError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Check the table invariants and return the total weight.
///
/// # Errors
///
/// Returns [`SelectError::InvalidConfiguration`] if the table is empty, any
/// cumulative weight is non-finite or non-positive, or the sequence is not
/// strictly increasing.
pub fn validate(table: &[WeightedEntry]) -> Result<f64, SelectError> {
    let last = table
        .last()
        .ok_or_else(|| SelectError::invalid("table is empty"))?;

    for (index, entry) in table.iter().enumerate() {
        let weight = entry.cumulative_weight;
        if !weight.is_finite() || weight <= 0.0 {
            return Err(SelectError::invalid(format!(
                "entry {index} ({}) has cumulative weight {weight}, expected a positive finite value",
                entry.tier.label
            )));
        }
    }

    for (index, pair) in table.windows(2).enumerate() {
        if let [prev, next] = pair {
            if next.cumulative_weight <= prev.cumulative_weight {
                return Err(SelectError::invalid(format!(
                    "entry {} ({}) has cumulative weight {} not above the previous {}",
                    index.saturating_add(1),
                    next.tier.label,
                    next.cumulative_weight,
                    prev.cumulative_weight
                )));
            }
        }
    }

    Ok(last.cumulative_weight)
}

/// Select the tier for a fixed draw value.
///
/// Returns the first entry whose cumulative weight is strictly greater than
/// `draw`, or the last entry when none is. Draws below zero land on the
/// first entry.
///
/// # Errors
///
/// Returns [`SelectError::InvalidConfiguration`] if the table fails [`validate`].
pub fn select_with_draw(table: &[WeightedEntry], draw: f64) -> Result<&RewardTier, SelectError> {
    validate(table)?;
    pick(table, draw)
}

/// Draw uniformly from `[0, total)` and select a tier.
///
/// # Errors
///
/// Returns [`SelectError::InvalidConfiguration`] if the table fails [`validate`].
pub fn select<'a, R: Rng + ?Sized>(
    table: &'a [WeightedEntry],
    rng: &mut R,
) -> Result<&'a RewardTier, SelectError> {
    let total = validate(table)?;
    let draw = rng.random_range(0.0..total);
    pick(table, draw)
}

/// Binary search over a table already known to be sorted.
fn pick(table: &[WeightedEntry], draw: f64) -> Result<&RewardTier, SelectError> {
    let index = table.partition_point(|entry| entry.cumulative_weight <= draw);
    table
        .get(index)
        .or_else(|| table.last())
        .map(|entry| &entry.tier)
        .ok_or_else(|| SelectError::invalid("table is empty"))
}

/// A validated cumulative weight table.
///
/// Construction enforces the table invariants once, so [`WeightTable::select`]
/// cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: Vec<WeightedEntry>,
    total: f64,
}

impl WeightTable {
    /// Wrap an already-cumulative list of entries.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::InvalidConfiguration`] if the entries fail [`validate`].
    pub fn new(entries: Vec<WeightedEntry>) -> Result<Self, SelectError> {
        let total = validate(&entries)?;
        Ok(Self { entries, total })
    }

    /// Build a table from raw per-tier weights by taking prefix sums.
    ///
    /// Tiers keep their input order.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::InvalidConfiguration`] if the list is empty or
    /// any raw weight is non-finite or non-positive.
    pub fn from_weights(weights: Vec<(f64, RewardTier)>) -> Result<Self, SelectError> {
        let mut running = 0.0_f64;
        let mut entries = Vec::with_capacity(weights.len());
        for (weight, tier) in weights {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(SelectError::invalid(format!(
                    "tier {} has weight {weight}, expected a positive finite value",
                    tier.label
                )));
            }
            running += weight;
            entries.push(WeightedEntry::new(running, tier));
        }
        Self::new(entries)
    }

    /// Draw one tier.
    ///
    /// # Errors
    ///
    /// Never fails for a table built through [`WeightTable::new`]; the
    /// [`SelectError`] is carried through from the shared lookup.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&RewardTier, SelectError> {
        let draw = rng.random_range(0.0..self.total);
        pick(&self.entries, draw)
    }

    /// Total weight (last cumulative weight).
    pub const fn total_weight(&self) -> f64 {
        self.total
    }

    /// The cumulative entries in table order.
    pub fn entries(&self) -> &[WeightedEntry] {
        &self.entries
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; a valid table has at least one tier.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Each tier's label and probability share, in table order.
    pub fn shares(&self) -> Vec<(&str, f64)> {
        let mut previous = 0.0_f64;
        self.entries
            .iter()
            .map(|entry| {
                let share = (entry.cumulative_weight - previous) / self.total;
                previous = entry.cumulative_weight;
                (entry.tier.label.as_str(), share)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn tier(label: &str) -> RewardTier {
        RewardTier::new(label, format!("{label}.png")).with_duration(5.0)
    }

    /// Cumulative weights [1, 4, 10] (raw weights 1, 3, 6).
    fn three_tiers() -> Vec<WeightedEntry> {
        vec![
            WeightedEntry::new(1.0, tier("common")),
            WeightedEntry::new(4.0, tier("rare")),
            WeightedEntry::new(10.0, tier("legendary")),
        ]
    }

    #[test]
    fn draws_at_boundaries_pick_the_next_tier() {
        let table = three_tiers();
        let label = |draw| select_with_draw(&table, draw).unwrap().label.clone();

        assert_eq!(label(0.0), "common");
        assert_eq!(label(0.999), "common");
        assert_eq!(label(1.0), "rare");
        assert_eq!(label(3.999), "rare");
        assert_eq!(label(4.0), "legendary");
        assert_eq!(label(10.0 - f64::EPSILON * 8.0), "legendary");
    }

    #[test]
    fn draw_at_or_beyond_total_falls_back_to_last() {
        let table = three_tiers();
        assert_eq!(select_with_draw(&table, 10.0).unwrap().label, "legendary");
        assert_eq!(select_with_draw(&table, 1e9).unwrap().label, "legendary");
    }

    #[test]
    fn negative_draw_lands_on_first() {
        let table = three_tiers();
        assert_eq!(select_with_draw(&table, -1.0).unwrap().label, "common");
    }

    #[test]
    fn single_tier_always_selected() {
        let table = vec![WeightedEntry::new(2.5, tier("only"))];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(select(&table, &mut rng).unwrap().label, "only");
        }
    }

    #[test]
    fn empty_table_is_invalid() {
        let err = select_with_draw(&[], 0.0).unwrap_err();
        assert!(matches!(err, SelectError::InvalidConfiguration { .. }));
    }

    #[test]
    fn unsorted_table_is_invalid() {
        let table = vec![
            WeightedEntry::new(4.0, tier("rare")),
            WeightedEntry::new(1.0, tier("common")),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select(&table, &mut rng).is_err());
    }

    #[test]
    fn repeated_cumulative_weight_is_invalid() {
        let table = vec![
            WeightedEntry::new(1.0, tier("a")),
            WeightedEntry::new(1.0, tier("b")),
        ];
        assert!(validate(&table).is_err());
    }

    #[test]
    fn non_positive_or_nan_weight_is_invalid() {
        assert!(validate(&[WeightedEntry::new(0.0, tier("zero"))]).is_err());
        assert!(validate(&[WeightedEntry::new(-3.0, tier("neg"))]).is_err());
        assert!(validate(&[WeightedEntry::new(f64::NAN, tier("nan"))]).is_err());
        assert!(validate(&[WeightedEntry::new(f64::INFINITY, tier("inf"))]).is_err());
    }

    #[test]
    fn from_weights_builds_prefix_sums() {
        let table = WeightTable::from_weights(vec![
            (1.0, tier("common")),
            (3.0, tier("rare")),
            (6.0, tier("legendary")),
        ])
        .unwrap();

        let cumulative: Vec<f64> = table.entries().iter().map(|e| e.cumulative_weight).collect();
        assert_eq!(cumulative, vec![1.0, 4.0, 10.0]);
        assert_eq!(table.total_weight(), 10.0);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn from_weights_rejects_zero_weight() {
        let result = WeightTable::from_weights(vec![(1.0, tier("a")), (0.0, tier("b"))]);
        assert!(result.is_err());
    }

    #[test]
    fn shares_reflect_raw_weights() {
        let table = WeightTable::new(three_tiers()).unwrap();
        let shares = table.shares();
        assert_eq!(shares.len(), 3);
        assert!((shares[0].1 - 0.1).abs() < 1e-12);
        assert!((shares[1].1 - 0.3).abs() < 1e-12);
        assert!((shares[2].1 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn sampling_matches_weight_shares() {
        let table = WeightTable::new(three_tiers()).unwrap();
        let mut rng = StdRng::seed_from_u64(0x6AC4A);
        let mut counts = [0_u32; 3];

        for _ in 0..10_000 {
            let picked = table.select(&mut rng).unwrap();
            let index = match picked.label.as_str() {
                "common" => 0,
                "rare" => 1,
                _ => 2,
            };
            counts[index] = counts[index].saturating_add(1);
        }

        let share = |count: u32| f64::from(count) / 10_000.0;
        assert!((share(counts[0]) - 0.10).abs() < 0.02, "common {counts:?}");
        assert!((share(counts[1]) - 0.30).abs() < 0.02, "rare {counts:?}");
        assert!((share(counts[2]) - 0.60).abs() < 0.02, "legendary {counts:?}");
    }
}
