use std::cmp::Ordering;
use std::fmt::Debug;

/// Binary search over the index range `[lo, hi)`, where `f(i)` compares the needle against
/// the element at index `i`. Returns `Ok(i)` on exact match, or `Err(i)` with the position
/// where the needle would have to be inserted to keep the order.
pub(crate) fn bsearch<I: UInt, F: Fn(I) -> Ordering>(mut lo: I, mut hi: I, f: F) -> Result<I, I> {
    while lo < hi {
        let mid = lo + (hi - lo) / I::from(2);
        match f(mid) {
            Ordering::Less => {
                hi = mid;
            }
            Ordering::Greater => {
                lo = mid + I::from(1);
            }
            Ordering::Equal => return Ok(mid),
        }
    }
    assert_eq!(lo, hi);
    Err(lo)
}

// Trait to use as a bound for unsigned integer, inspired by:
// https://users.rust-lang.org/t/difficulty-creating-numeric-trait/34345/4
pub(crate) trait UInt: Copy
    + Ord
    + Sized
    + Debug
    + From<u8>
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Div<Output = Self>
    + std::cmp::Eq
    + std::cmp::PartialEq<Self> {}

impl UInt for u8 {}
impl UInt for u16 {}
impl UInt for u32 {}
impl UInt for u64 {}
impl UInt for u128 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bsearch() {
        let xs = [10u32, 20, 30, 40];
        let search = |x: u32| bsearch(0u32, xs.len() as u32, |i| x.cmp(&xs[i as usize]));

        assert_eq!(search(10), Ok(0));
        assert_eq!(search(40), Ok(3));
        assert_eq!(search(5), Err(0));
        assert_eq!(search(25), Err(2));
        assert_eq!(search(45), Err(4));
        assert_eq!(bsearch(0u32, 0, |_| Ordering::Less), Err(0));
    }
}
