//! Tests for drop counters, dead-letter sinks and event serialization.

use ironshuffle::testing::{first_token_of_record, read_lines};
use ironshuffle::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_drop_counters() {
    let mut a = DropCounters::default();
    a.increment(DropReason::KeyExtraction);
    a.increment(DropReason::KeyExtraction);
    a.increment(DropReason::UnsupportedShape);
    assert_eq!(a.get(DropReason::KeyExtraction), 2);
    assert_eq!(a.total(), 3);

    let mut b = DropCounters::default();
    b.increment(DropReason::ShapeMismatch);
    b.merge(&a);
    assert_eq!(b.total(), 4);
    assert_eq!(
        b.to_json(),
        json!({
            "shape_mismatch": 1,
            "transform_failed": 0,
            "unsupported_shape": 1,
            "key_extraction": 2,
            "total": 4,
        })
    );
}

#[test]
fn test_stage_and_reason_display() {
    assert_eq!(Stage::Partition.to_string(), "partition");
    assert_eq!(DropReason::TransformFailed.to_string(), "transform_failed");
    assert_eq!(
        serde_json::to_value(DropReason::UnsupportedShape).unwrap(),
        json!("unsupported_shape")
    );
}

#[test]
fn test_jsonl_dead_letters_round_trip() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("audit/dead.jsonl");
    let sink = Arc::new(JsonlDeadLetters::create(&path)?);
    assert_eq!(sink.path(), path);

    let records = vec![
        Record::from("ok 1\n"),
        Record::Bytes(vec![1, 2, 3]),
        Record::from("\n"),
        Record::from("ok 2\n"),
    ];
    let source = Source::new("audited", StoreMedium::new("mem", records.into_iter(), 4, 5))
        .with_events(Arc::new(NullSink));
    let mut p = Partitioner::new(source, 2, &[tmp.path().join("out")], HashSplit::new(first_token_of_record))?
        .with_events(Arc::new(NullSink))
        .with_dead_letters(sink.clone());
    let report = p.run()?;
    assert_eq!(report.records_written, 2);

    let lines = read_lines(&path)?;
    assert_eq!(lines.len(), 2);
    let letters: Vec<DeadLetter> = lines
        .iter()
        .map(|l| serde_json::from_str(l))
        .collect::<std::result::Result<_, _>>()?;
    // Bytes has no first token either, so the key function rejects it first
    assert!(letters.iter().all(|l| l.stage == Stage::Partition));
    assert!(letters.iter().all(|l| l.reason == DropReason::KeyExtraction));
    Ok(())
}

#[test]
fn test_memory_dead_letters_from_every_stage() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let dead = Arc::new(MemoryDeadLetters::new());
    assert!(dead.is_empty());

    let records = vec![
        Record::from("drop-me\n"),
        Record::from("b 1\n"),
        Record::Bytes(vec![0]),
        Record::from("a 1\n"),
    ];
    let source = Source::new("stages", StoreMedium::new("mem", records.into_iter(), 4, 4))
        .with_events(Arc::new(NullSink))
        .with_dead_letters(dead.clone())
        .with_transform(|r: Record| {
            if r.as_scalar() == Some("drop-me\n") {
                Err(TransformError::Failed(anyhow::anyhow!("unwanted")))
            } else {
                Ok(r)
            }
        });
    let mut p = Partitioner::new(source, 1, &[tmp.path()], RoundRobinSplit::new())?
        .with_events(Arc::new(NullSink))
        .with_dead_letters(dead.clone());
    p.run()?;

    let mut sorter = Sorter::new(p.shard_paths().to_vec(), |line: &str| -> anyhow::Result<String> {
        line.strip_prefix('b')
            .map(|_| line.to_string())
            .ok_or_else(|| anyhow::anyhow!("only b lines have keys"))
    })
    .with_events(Arc::new(NullSink))
    .with_dead_letters(dead.clone());
    sorter.sort()?;
    let merged: Vec<String> = sorter.merge()?.collect::<Result<_>>()?;
    assert_eq!(merged, vec!["b 1"]);

    let stages: Vec<(Stage, DropReason)> = dead.letters().iter().map(|l| (l.stage, l.reason)).collect();
    assert_eq!(
        stages,
        vec![
            (Stage::Source, DropReason::TransformFailed),
            (Stage::Partition, DropReason::UnsupportedShape),
            (Stage::Merge, DropReason::KeyExtraction),
        ]
    );
    assert_eq!(dead.len(), 3);
    Ok(())
}

#[test]
fn test_events_serialize_with_tag() -> anyhow::Result<()> {
    let event = ShuffleEvent::RecordDropped {
        stage: Stage::Merge,
        reason: DropReason::KeyExtraction,
        record: String::new(),
        detail: "no token".to_string(),
    };
    let v = serde_json::to_value(&event)?;
    assert_eq!(v["event"], json!("record_dropped"));
    assert_eq!(v["stage"], json!("merge"));
    assert_eq!(v["reason"], json!("key_extraction"));

    let finished = ShuffleEvent::MergeFinished {
        emitted: 3,
        total_lines: 4,
        total_bytes: 20,
    };
    assert_eq!(
        serde_json::to_value(&finished)?,
        json!({"event": "merge_finished", "emitted": 3, "total_lines": 4, "total_bytes": 20})
    );
    Ok(())
}

#[test]
fn test_tracing_sink_emits_under_subscriber() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let sink = TracingSink;
        sink.emit(&ShuffleEvent::PartitionStarted {
            source: "traced".to_string(),
            shards: 2,
        });
        sink.emit(&ShuffleEvent::RecordDropped {
            stage: Stage::Source,
            reason: DropReason::ShapeMismatch,
            record: "a b".to_string(),
            detail: "2 fields".to_string(),
        });
    });
}
