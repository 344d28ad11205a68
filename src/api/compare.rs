use std::cmp::Ordering;

/// Sort order over keys. The identifier of the comparator is persisted in the file header,
/// so a database must always be reopened with the comparator it was created with.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Comparator {
    /// Byte-wise lexicographic, a key that is a prefix of another sorts first.
    #[default]
    Lexical,
    /// Keys are big-endian unsigned integers of arbitrary width.
    Numeric,
    /// Keys are ASCII decimal numbers, e.g. `b"-12.5"`.
    Decimal,
}

impl Comparator {
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Comparator::Lexical => a.cmp(b),
            Comparator::Numeric => numeric(a, b).then_with(|| a.cmp(b)),
            Comparator::Decimal => decimal(a, b).then_with(|| a.cmp(b)),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        match self {
            Comparator::Lexical => 0,
            Comparator::Numeric => 1,
            Comparator::Decimal => 2,
        }
    }

    pub(crate) fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Comparator::Lexical),
            1 => Some(Comparator::Numeric),
            2 => Some(Comparator::Decimal),
            _ => None,
        }
    }
}

fn numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip(a);
    let b = strip(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip(x: &[u8]) -> &[u8] {
    let zeros = x.iter().take_while(|b| **b == 0).count();
    &x[zeros..]
}

fn decimal(a: &[u8], b: &[u8]) -> Ordering {
    let a = parse(a);
    let b = parse(b);
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// Unparseable keys are treated as zero.
fn parse(x: &[u8]) -> f64 {
    std::str::from_utf8(x)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical() {
        let cmp = Comparator::Lexical;
        assert_eq!(cmp.compare(b"a", b"b"), Ordering::Less);
        assert_eq!(cmp.compare(b"ab", b"a"), Ordering::Greater);
        assert_eq!(cmp.compare(b"", b"a"), Ordering::Less);
        assert_eq!(cmp.compare(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn test_numeric() {
        let cmp = Comparator::Numeric;
        assert_eq!(cmp.compare(&[0x01, 0x00], &[0xff]), Ordering::Greater);
        assert_eq!(cmp.compare(&[0x00, 0x05], &[0x06]), Ordering::Less);
        assert_eq!(cmp.compare(&[0x00, 0x05], &[0x05]), Ordering::Less);
        assert_eq!(
            cmp.compare(&1000u64.to_be_bytes(), &999u64.to_be_bytes()),
            Ordering::Greater
        );
    }

    #[test]
    fn test_decimal() {
        let cmp = Comparator::Decimal;
        assert_eq!(cmp.compare(b"9", b"10"), Ordering::Less);
        assert_eq!(cmp.compare(b"-1.5", b"-2"), Ordering::Greater);
        assert_eq!(cmp.compare(b"1.0", b"1"), Ordering::Greater);
    }

    #[test]
    fn test_ids() {
        for cmp in [Comparator::Lexical, Comparator::Numeric, Comparator::Decimal] {
            assert_eq!(Comparator::from_id(cmp.id()), Some(cmp));
        }
        assert_eq!(Comparator::from_id(42), None);
    }
}
