// src/barcode.rs

use barcoders::sym::code128::Code128;
use tracing::warn;

/// Code 128 modules of one barcode, 1 = bar, 0 = space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    modules: Vec<u8>,
}

impl Barcode {
    /// Encode a numeric access key in character set C. `None` when the
    /// payload cannot be encoded.
    pub fn access_key(key: &str) -> Option<Self> {
        let digits: String = key.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() || digits.len() % 2 != 0 {
            warn!(key, "Access key not encodable in set C, barcode omitted");
            return None;
        }
        // `Ć` selects character set C.
        match Code128::new(format!("Ć{digits}")) {
            Ok(code) => Some(Self { modules: code.encode() }),
            Err(e) => {
                warn!(key, error = %e, "Barcode encoding failed, barcode omitted");
                None
            }
        }
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Bars as (first module, width in modules), left to right.
    pub fn bars(&self) -> Vec<(usize, usize)> {
        let mut bars = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &m) in self.modules.iter().enumerate() {
            match (m == 1, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    bars.push((s, i - s));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            bars.push((s, self.modules.len() - s));
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "35240311222333000144550010000012341000012345";

    #[test]
    fn test_access_key_bars() {
        let code = Barcode::access_key(KEY).unwrap();
        // Start C, 22 digit pairs and the checksum, then the stop pattern.
        assert!(code.module_count() >= 24 * 11 + 13);
        let bars = code.bars();
        assert!(!bars.is_empty());
        let dark: usize = bars.iter().map(|(_, w)| w).sum();
        assert!(dark > 0 && dark < code.module_count());
        assert_eq!(bars.last().map(|(s, w)| s + w), Some(code.module_count()));
    }

    #[test]
    fn test_odd_or_empty_key_is_omitted() {
        assert!(Barcode::access_key("123").is_none());
        assert!(Barcode::access_key("").is_none());
    }

    #[test]
    fn test_bars_from_modules() {
        let code = Barcode {
            modules: vec![1, 1, 0, 1, 0, 0, 1, 1, 1],
        };
        assert_eq!(code.bars(), vec![(0, 2), (3, 1), (6, 3)]);
    }
}
