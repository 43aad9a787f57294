//! Part arithmetic for splitting a payload into radio-sized slices.

use bytes::Bytes;
use std::ops::Range;

/// Number of parts needed to carry `payload_len` bytes in parts of `part_size`.
/// Returns 0 when `part_size` is 0.
pub fn total_parts(payload_len: usize, part_size: u32) -> u32 {
    if part_size == 0 {
        return 0;
    }
    let part_size = part_size as usize;
    ((payload_len + part_size - 1) / part_size) as u32
}

/// Byte range of part `index`. The final part may be shorter than `part_size`.
/// Returns `None` for a zero part size or an index past the end of the payload.
pub fn part_range(index: u32, part_size: u32, payload_len: usize) -> Option<Range<usize>> {
    if part_size == 0 {
        return None;
    }
    let start = (index as usize).checked_mul(part_size as usize)?;
    if start >= payload_len {
        return None;
    }
    let end = std::cmp::min(start + part_size as usize, payload_len);
    Some(start..end)
}

/// Slice part `index` out of `payload` without copying
pub fn slice_part(payload: &Bytes, index: u32, part_size: u32) -> Option<Bytes> {
    part_range(index, part_size, payload.len()).map(|range| payload.slice(range))
}

/// Percentage done after part `index` of `total`, rounded up and clamped to 100
pub fn progress_percent(index: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = index as u64 + 1;
    let total = total as u64;
    let percent = (done * 100 + total - 1) / total;
    percent.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_parts_is_ceiling() {
        for payload_len in 0..300usize {
            for part_size in 1..40u32 {
                let expected = (payload_len as f64 / part_size as f64).ceil() as u32;
                assert_eq!(total_parts(payload_len, part_size), expected);
            }
        }
        assert_eq!(total_parts(300, 100), 3);
        assert_eq!(total_parts(301, 100), 4);
        assert_eq!(total_parts(100, 0), 0);
    }

    #[test]
    fn test_part_range() {
        assert_eq!(part_range(0, 30, 100), Some(0..30));
        assert_eq!(part_range(3, 30, 100), Some(90..100));
        assert_eq!(part_range(4, 30, 100), None);
        assert_eq!(part_range(0, 0, 100), None);
        assert_eq!(part_range(0, 30, 0), None);
    }

    #[test]
    fn test_slice_part_short_tail() {
        let payload = Bytes::from((0..10u8).collect::<Vec<_>>());
        assert_eq!(slice_part(&payload, 0, 4).unwrap().as_ref(), &[0, 1, 2, 3]);
        assert_eq!(slice_part(&payload, 2, 4).unwrap().as_ref(), &[8, 9]);
        assert!(slice_part(&payload, 3, 4).is_none());
    }

    #[test]
    fn test_progress_rounds_up() {
        assert_eq!(progress_percent(0, 3), 34);
        assert_eq!(progress_percent(1, 3), 67);
        assert_eq!(progress_percent(2, 3), 100);
        assert_eq!(progress_percent(0, 1), 100);
        assert_eq!(progress_percent(9, 3), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }
}
