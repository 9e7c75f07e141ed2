//! Labeled counters tracked across a pass. Labels report in insertion
//! order, so the summary reads in the order events first happened.

use linked_hash_map::LinkedHashMap;

#[derive(Default, Debug)]
pub struct Statistics {
    counters: LinkedHashMap<String, u64>,
}

impl Statistics {
    /// Add `count` to the counter with the given label, creating it at zero
    /// first if needed.
    pub fn add_sum<S: Into<String>>(&mut self, label: S, count: u64) {
        *self.counters.entry(label.into()).or_insert(0) += count;
    }

    /// Current value of a labeled counter; absent counters read as zero.
    pub fn sum_named(&self, label: &str) -> u64 {
        self.counters.get(label).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Write the counters to the log.
    pub fn report(&self) {
        for (label, value) in self.iter() {
            log::info!("{}: {}", label, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_keep_order() {
        let mut stats = Statistics::default();
        stats.add_sum("Optimizations, Unrolled Loops", 1);
        stats.add_sum("Unrolling gave up, too many statements", 1);
        stats.add_sum("Optimizations, Unrolled Loops", 2);
        assert_eq!(stats.sum_named("Optimizations, Unrolled Loops"), 3);
        assert_eq!(stats.sum_named("no such label"), 0);
        let labels: Vec<_> = stats.iter().map(|(l, _)| l).collect();
        assert_eq!(
            labels,
            vec![
                "Optimizations, Unrolled Loops",
                "Unrolling gave up, too many statements"
            ]
        );
    }
}
