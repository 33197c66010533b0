//! Integration tests for the byte-range filter.

use std::io::{Cursor, Read};

use pdf_seal::signatures::{ByteRange, ByteRangeCalculator, ByteRangeReader};
use pdf_seal::Error;
use proptest::prelude::*;

/// Buffer plus ordered, disjoint spans inside it.
fn buffer_and_spans() -> impl Strategy<Value = (Vec<u8>, Vec<(u64, u64)>)> {
    prop::collection::vec(any::<u8>(), 1..4096).prop_flat_map(|data| {
        let len = data.len();
        let cuts = prop::collection::vec(0..=len, 0..8);
        (Just(data), cuts).prop_map(|(data, mut cuts)| {
            cuts.sort_unstable();
            let spans = cuts
                .chunks(2)
                .filter(|pair| pair.len() == 2)
                .map(|pair| (pair[0] as u64, (pair[1] - pair[0]) as u64))
                .collect();
            (data, spans)
        })
    })
}

proptest! {
    /// Property: the reader yields exactly the concatenation of the spans
    #[test]
    fn reader_yields_concatenated_spans((data, spans) in buffer_and_spans()) {
        let expected: Vec<u8> = spans
            .iter()
            .flat_map(|&(offset, length)| data[offset as usize..(offset + length) as usize].to_vec())
            .collect();

        let range = ByteRange::new(spans);
        prop_assert_eq!(range.total_len(), expected.len() as u64);

        let mut reader = ByteRangeReader::new(Cursor::new(data), &range).unwrap();
        let mut actual = Vec::new();
        reader.read_to_end(&mut actual).unwrap();
        prop_assert_eq!(actual, expected);
    }

    /// Property: a span past the end of the data is rejected up front
    #[test]
    fn span_past_end_is_rejected(len in 0usize..512, overshoot in 1u64..64) {
        let range = ByteRange::new(vec![(0, len as u64 + overshoot)]);
        let result = ByteRangeReader::new(Cursor::new(vec![0u8; len]), &range);
        let rejected = matches!(result, Err(Error::ByteRangeOutOfBounds { .. }));
        prop_assert!(rejected);
    }

    /// Property: the resolved range always surrounds the placeholder exactly
    #[test]
    fn calculated_range_surrounds_placeholder(
        estimated in 1usize..512,
        before in 0u64..10_000,
        after in 0u64..10_000,
    ) {
        let calculator = ByteRangeCalculator::new(estimated);
        let placeholder = calculator.placeholder_size() as u64;
        let file_size = before + placeholder + after;

        let range = calculator.calculate_byte_range(file_size, before);
        prop_assert_eq!(range.to_pdf_array(), vec![
            0,
            before as i64,
            (before + placeholder) as i64,
            after as i64,
        ]);
        prop_assert_eq!(range.total_len() + placeholder, file_size);
        prop_assert!(range.covers_whole_document(file_size));

        let text = ByteRangeCalculator::format_byte_range(&range).unwrap();
        prop_assert_eq!(text.len(), ByteRangeCalculator::BYTE_RANGE_WIDTH);
    }
}

#[test]
fn test_reader_over_signed_layout() {
    let data = b"%PDF-1.7 head <0000> tail%%EOF".to_vec();
    let start = data.iter().position(|&b| b == b'<').unwrap() as u64;
    let end = data.iter().position(|&b| b == b'>').unwrap() as u64 + 1;
    let range = ByteRange::around(start, end, data.len() as u64);

    let mut reader = ByteRangeReader::new(Cursor::new(data), &range).unwrap();
    let mut signed = String::new();
    reader.read_to_string(&mut signed).unwrap();
    assert_eq!(signed, "%PDF-1.7 head  tail%%EOF");
}
