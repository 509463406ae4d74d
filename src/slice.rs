/// Resolve an inclusive `start`/`stop` pair (negative values count from the
/// end, -1 being the last item) into a half-open range over a sequence of
/// `len` items. `None` means the selection is empty.
pub fn resolve(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = i64::try_from(len).ok()?;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    start = start.max(0);
    stop = stop.min(len - 1);
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    let start = usize::try_from(start).ok()?;
    let stop = usize::try_from(stop).ok()?;
    Some((start, stop + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive() {
        assert_eq!(resolve(5, 0, 4), Some((0, 5)));
        assert_eq!(resolve(5, 1, 3), Some((1, 4)));
        assert_eq!(resolve(5, 0, 100), Some((0, 5)));
    }

    #[test]
    fn negative() {
        assert_eq!(resolve(5, 0, -1), Some((0, 5)));
        assert_eq!(resolve(5, -2, -1), Some((3, 5)));
        assert_eq!(resolve(5, -100, -1), Some((0, 5)));
    }

    #[test]
    fn empty() {
        assert_eq!(resolve(0, 0, -1), None);
        assert_eq!(resolve(5, 3, 1), None);
        assert_eq!(resolve(5, 5, 10), None);
        assert_eq!(resolve(5, 0, -6), None);
    }
}
