use proptest::prelude::*;
use span_stream::{codec, BatchConfig, BatchProcessor, Host, InMemorySpanStore, Span, SpanBatch, SpanCollector};

fn span_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("new_span".to_string()),
        Just("old_span".to_string()),
        "[a-z_]{1,12}",
    ]
}

fn arb_batch() -> impl Strategy<Value = SpanBatch> {
    prop::collection::vec((any::<u8>(), any::<u64>(), span_name()), 0..20).prop_map(|spans| {
        SpanBatch::with_spans(
            Host::local("svc"),
            spans
                .into_iter()
                .map(|(trace, id, name)| Span::new(u128::from(trace), id, None, name))
                .collect(),
        )
    })
}

proptest! {
    /// The collector stores a batch exactly when it holds a matching span,
    /// and every stored batch still holds one.
    #[test]
    fn prop_collector_keeps_only_matching_batches(batches in prop::collection::vec(arb_batch(), 0..20)) {
        let collector = SpanCollector::matching_name("new_span");
        let mut expected = 0;
        for batch in batches {
            let matches = batch.find_by_name("new_span").is_some();
            prop_assert_eq!(collector.on_batch(batch), matches);
            expected += usize::from(matches);
        }

        prop_assert_eq!(collector.len(), expected);
        for batch in collector.batches() {
            prop_assert!(batch.find_by_name("new_span").is_some());
        }
    }

    /// Batches survive the wire format unchanged.
    #[test]
    fn prop_codec_preserves_batches(batch in arb_batch()) {
        let decoded = codec::decode(&codec::encode(&batch).unwrap()).unwrap();
        prop_assert_eq!(decoded, batch);
    }

    /// Whatever order spans arrive in, a taken batch holds every span once
    /// and keeps each trace contiguous.
    #[test]
    fn prop_batch_processor_keeps_traces_contiguous(spans in prop::collection::vec((0u8..5, any::<u64>()), 1..50)) {
        let mut processor = BatchProcessor::new(BatchConfig::default());
        for (trace, id) in &spans {
            processor.add(Span::new(u128::from(*trace), *id, None, "op"));
        }

        let batch = processor.take_batch(&Host::local("svc")).unwrap();
        prop_assert_eq!(batch.len(), spans.len());

        let mut seen = Vec::new();
        for span in &batch.spans {
            if seen.last() != Some(&span.trace_id()) {
                prop_assert!(!seen.contains(&span.trace_id()));
                seen.push(span.trace_id());
            }
        }
    }

    /// Accepting any sequence of batches twice stores nothing new the second time.
    #[test]
    fn prop_store_is_idempotent(batches in prop::collection::vec(arb_batch(), 0..10)) {
        let store = InMemorySpanStore::new();
        for batch in &batches {
            store.accept(batch);
        }
        let count = store.span_count();
        for batch in &batches {
            prop_assert_eq!(store.accept(batch), 0);
        }
        prop_assert_eq!(store.span_count(), count);
    }
}
