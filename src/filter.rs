//! Flash extract validity filter.
//!
//! A flash extract always returns the whole device, so everything after the last logged
//! sample is erased memory. Erased memory decodes to the same row over and over, while
//! logged samples always differ from their neighbour (at the very least the timestamp
//! advances). The extract is therefore "distinct prefix, then constant suffix" and the
//! boundary can be found with a binary search on `rows[i] == rows[i + 1]`.
//!
//! Known fragility: a genuine plateau where two consecutive frames are bit-identical
//! would be taken for the start of erased memory.

/// Return the rows that hold logged data, or `None` when the extract is one uniform run
/// (nothing was ever recorded).
///
/// The last distinct row before the constant run is dropped together with the run: it
/// is the frame that was being written when logging stopped and is not trusted.
pub fn valid_prefix<T: PartialEq>(rows: &[T]) -> Option<&[T]> {
    if rows.is_empty() {
        return None;
    }

    // Invariant: the first index `i` with rows[i] == rows[i + 1] lies in
    // start_index..=end_index, where end_index == len - 1 stands for "no repeat found".
    let mut start_index = 0usize;
    let mut end_index = rows.len() - 1;
    while start_index < end_index {
        let mid = start_index + (end_index - start_index) / 2;
        if rows[mid] == rows[mid + 1] {
            end_index = mid;
        } else {
            start_index = mid + 1;
        }
    }

    match start_index {
        0 => None,
        boundary => Some(&rows[..boundary - 1]),
    }
}

/// Owned variant of [`valid_prefix`]; `None` maps to an empty vector.
pub fn filter_extract<T: PartialEq + Clone>(rows: &[T]) -> Vec<T> {
    valid_prefix(rows).map(<[T]>::to_vec).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(distinct: usize, repeated: usize) -> Vec<u32> {
        (0..distinct as u32)
            .chain(std::iter::repeat(u32::MAX).take(repeated))
            .collect()
    }

    #[test]
    fn keeps_all_but_the_last_distinct_row() {
        for distinct in 1..40 {
            for repeated in 2..12 {
                let rows = extract(distinct, repeated);
                let kept = valid_prefix(&rows).unwrap();
                assert_eq!(kept, &rows[..distinct - 1], "n={distinct} m={repeated}");
            }
        }
    }

    #[test]
    fn uniform_extract_means_no_data() {
        for len in 1..20 {
            assert_eq!(valid_prefix(&vec![7u8; len]), None);
        }
        assert_eq!(valid_prefix::<u8>(&[]), None);
    }

    #[test]
    fn extract_without_erased_tail_drops_the_final_two_rows() {
        let rows: Vec<u32> = (0..8).collect();
        assert_eq!(valid_prefix(&rows).unwrap(), &rows[..6]);
    }

    #[test]
    fn rows_compare_structurally() {
        let rows = vec![
            vec![0.0, 1.0],
            vec![0.1, 1.0],
            vec![0.2, 1.5],
            vec![4294967.295, 0.0],
            vec![4294967.295, 0.0],
            vec![4294967.295, 0.0],
        ];
        assert_eq!(filter_extract(&rows), rows[..2].to_vec());
    }

    #[test]
    fn owned_variant_is_empty_for_no_data() {
        assert!(filter_extract(&[1u8, 1, 1, 1]).is_empty());
    }
}
