use std::collections::HashMap;

/// Occurrence counts per observed value, remembering first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    counts: HashMap<String, u64>,
    seen: Vec<String>,
}

impl FrequencyTable {
    pub fn observe(&mut self, value: &str) {
        match self.counts.get_mut(value) {
            Some(n) => *n += 1,
            None => {
                self.counts.insert(value.to_string(), 1);
                self.seen.push(value.to_string());
            }
        }
    }

    pub fn get(&self, value: &str) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.counts.contains_key(value)
    }

    /// Observed values in first-seen order.
    pub fn values(&self) -> &[String] {
        &self.seen
    }
}

/// Running count, sum, sum of squares, min and max.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub n: u64,
    pub x: f64,
    pub x2: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Moments {
    pub fn observe(&mut self, v: f64) {
        self.n += 1;
        self.x += v;
        self.x2 += v * v;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.x / self.n as f64
    }

    /// Sample variance; `None` below two observations.
    pub fn variance(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let n = self.n as f64;
        let mean = self.mean();
        // Rounding can push a zero-spread result slightly negative.
        Some(((self.x2 - n * mean * mean) / (n - 1.0)).max(0.0))
    }

    pub fn sd(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

/// The accumulator kind for one attribute, fixed by configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeAggregate {
    Discrete(FrequencyTable),
    Continuous(Moments),
}

/// Everything gathered for one area code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaAggregate {
    pub certificates: u64,
    pub attributes: HashMap<String, AttributeAggregate>,
}

impl AreaAggregate {
    pub fn frequencies(&self, attribute: &str) -> Option<&FrequencyTable> {
        match self.attributes.get(attribute) {
            Some(AttributeAggregate::Discrete(table)) => Some(table),
            _ => None,
        }
    }

    pub fn moments(&self, attribute: &str) -> Option<&Moments> {
        match self.attributes.get(attribute) {
            Some(AttributeAggregate::Continuous(m)) => Some(m),
            _ => None,
        }
    }
}
