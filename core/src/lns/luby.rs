//! # Luby Driven Adaptive Difficulty
//!
//! A difficulty in `[0, 1]` per Luby value. Each call advances the Luby
//! sequence and the difficulty of the current Luby value is moved up or down
//! depending on how the neighborhood turned out. The steps shrink with the
//! number of changes so the value settles.

const MAX_LUBY_INDEX: usize = 30;
const MAX_BOOST: u32 = 30;

/// The `i`-th element (starting at 1) of the Luby sequence
/// `1, 1, 2, 1, 1, 2, 4, 1, 1, 2, ...`
pub(crate) fn luby(mut i: u64) -> u64 {
    debug_assert!(i > 0);
    loop {
        // smallest k with i <= 2^k - 1
        let mut k = 1;
        while (1u64 << k) - 1 < i {
            k += 1;
        }
        if i == (1u64 << k) - 1 {
            return 1 << (k - 1);
        }
        i -= (1u64 << (k - 1)) - 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AdaptiveParameterValue {
    value: f64,
    n_changes: u32,
}

impl AdaptiveParameterValue {
    pub fn new(initial: f64) -> Self {
        AdaptiveParameterValue {
            value: initial,
            n_changes: 0,
        }
    }

    fn factor(&mut self) -> f64 {
        self.n_changes += 1;
        1. + 1. / (self.n_changes / 2 + 1) as f64
    }

    pub fn increase(&mut self) {
        let factor = self.factor();
        self.value = f64::min(1. - (1. - self.value) / factor, self.value * factor);
    }

    pub fn decrease(&mut self) {
        let factor = self.factor();
        self.value = f64::max(self.value / factor, 1. - (1. - self.value) * factor);
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[derive(Clone, Debug)]
pub(crate) struct LubyAdaptiveParameterValue {
    initial: f64,
    luby_id: u64,
    boost: u32,
    luby_value: usize,
    difficulties: Vec<AdaptiveParameterValue>,
}

impl LubyAdaptiveParameterValue {
    pub fn new(initial: f64) -> Self {
        LubyAdaptiveParameterValue {
            initial,
            luby_id: 0,
            boost: 0,
            luby_value: 1,
            difficulties: vec![AdaptiveParameterValue::new(initial); MAX_LUBY_INDEX],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.initial);
    }

    /// Advances the Luby sequence
    pub fn update_luby(&mut self) {
        self.luby_id += 1;
        let value = luby(self.luby_id) << self.boost;
        self.luby_value = usize::try_from(value)
            .unwrap_or(MAX_LUBY_INDEX)
            .clamp(1, MAX_LUBY_INDEX);
    }

    /// Shifts the Luby sequence towards larger values, returns `true` once
    /// the boost is maxed out
    pub fn boost_luby(&mut self) -> bool {
        self.boost = (self.boost + 1).min(MAX_BOOST);
        self.boost >= MAX_BOOST
    }

    pub fn luby_value(&self) -> usize {
        self.luby_value
    }

    pub fn increase(&mut self) {
        self.difficulties[self.luby_value - 1].increase();
    }

    pub fn decrease(&mut self) {
        self.difficulties[self.luby_value - 1].decrease();
    }

    pub fn value(&self) -> f64 {
        self.difficulties[self.luby_value - 1].value()
    }
}

#[cfg(test)]
mod tests {
    use super::{luby, AdaptiveParameterValue, LubyAdaptiveParameterValue};

    #[test]
    fn luby_sequence() {
        let seq: Vec<_> = (1..=15).map(luby).collect();
        assert_eq!(seq, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn steps_shrink() {
        let mut param = AdaptiveParameterValue::new(0.5);
        param.increase();
        assert!((param.value() - 0.75).abs() < 1e-12);
        param.decrease();
        assert!((param.value() - 0.625).abs() < 1e-12);
        param.increase();
        assert!((param.value() - 0.75).abs() < 1e-12);
        for _ in 0..100 {
            param.increase();
        }
        assert!(param.value() <= 1.);
        assert!(param.value() > 0.99);
    }

    #[test]
    fn difficulty_per_luby_value() {
        let mut diff = LubyAdaptiveParameterValue::new(0.5);
        diff.update_luby();
        assert_eq!(diff.luby_value(), 1);
        diff.increase();
        diff.update_luby();
        diff.update_luby();
        assert_eq!(diff.luby_value(), 2);
        assert_eq!(diff.value(), 0.5);
        diff.update_luby();
        assert!(diff.value() > 0.5);
        assert!(!diff.boost_luby());
        diff.update_luby();
        assert_eq!(diff.luby_value(), 2);
        diff.reset();
        diff.update_luby();
        assert_eq!(diff.value(), 0.5);
    }
}
