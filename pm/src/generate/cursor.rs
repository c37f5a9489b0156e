//! Mixed-radix enumeration of the combinatorial space
//!
//! One digit per active placeholder; the last digit varies fastest. The cursor
//! holds only the current digit vector, so spaces far too large to
//! materialize are walked in constant memory.

/// Product of all radices, saturating at `u128::MAX`
pub fn space_size(radices: &[usize]) -> u128 {
    radices
        .iter()
        .fold(1u128, |acc, &radix| acc.saturating_mul(radix as u128))
}

#[derive(Debug, Clone)]
pub struct MixedRadixCursor {
    radices: Vec<usize>,
    digits: Vec<usize>,
    done: bool,
}

impl MixedRadixCursor {
    pub fn new(radices: Vec<usize>) -> Self {
        let done = radices.contains(&0);
        let digits = vec![0; radices.len()];
        Self { radices, digits, done }
    }
}

impl Iterator for MixedRadixCursor {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.digits.clone();

        // Increment with carry from the last digit
        for i in (0..self.digits.len()).rev() {
            self.digits[i] += 1;
            if self.digits[i] < self.radices[i] {
                return Some(current);
            }
            self.digits[i] = 0;
        }
        self.done = true;
        Some(current)
    }
}
