//! Tests for sources, media and per-record transforms.

use ironshuffle::testing::write_fixture_lines;
use ironshuffle::*;
use std::sync::Arc;
use tempfile::TempDir;

fn scalar(r: &Record) -> String {
    r.as_scalar().unwrap().to_string()
}

#[test]
fn test_file_medium_concatenates_files_in_order() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let a = write_fixture_lines(tmp.path().join("a.txt"), &["one", "two"])?;
    let b = write_fixture_lines(tmp.path().join("b.txt"), &["three"])?;

    let source = Source::new("files", FileMedium::open([&a, &b])?);
    let records: Vec<String> = source.map(|r| r.map(|r| scalar(&r))).collect::<Result<_>>()?;
    assert_eq!(records, vec!["one\n", "two\n", "three\n"]);
    Ok(())
}

#[test]
fn test_file_medium_missing_input() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.txt");
    let err = FileMedium::open([&missing]).err().unwrap();
    assert!(matches!(err, ShuffleError::InputNotFound(p) if p == missing));
}

#[test]
fn test_progress_accounting() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    // 4 + 7 = 11 bytes
    let a = write_fixture_lines(tmp.path().join("a.txt"), &["abc", "abcdef"])?;

    let mut source = Source::new("files", FileMedium::open([&a])?);
    assert_eq!(source.size(), 11);
    assert_eq!(source.length(), None);
    assert_eq!(source.progress(), Some(0.0));

    source.next().unwrap()?;
    assert_eq!(source.current_length(), 1);
    assert_eq!(source.current_size(), 4);

    source.next().unwrap()?;
    assert!(source.next().is_none());
    assert_eq!(source.current_size(), 11);
    assert_eq!(source.progress(), Some(100.0));

    let details = source.progress_details();
    assert_eq!(details.current_length, 2);
    assert_eq!(details.total_size, 11);
    Ok(())
}

#[test]
fn test_empty_input_has_no_progress() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let empty = tmp.path().join("empty.txt");
    std::fs::write(&empty, "")?;

    let mut source = Source::new("empty", FileMedium::open([&empty])?);
    assert!(source.next().is_none());
    assert_eq!(source.progress(), None);
    Ok(())
}

#[test]
fn test_store_medium_uses_reported_counts() -> anyhow::Result<()> {
    let records = vec![Record::from("a"), Record::from("b"), Record::from("c")];
    let medium = StoreMedium::new("store://words", records.into_iter(), 3, 10);
    let mut source = Source::new("store", medium);

    assert_eq!(source.length(), Some(3));
    assert_eq!(source.size(), 30);
    source.next().unwrap()?;
    assert_eq!(source.current_size(), 10);
    assert_eq!(source.by_ref().count(), 2);
    assert_eq!(source.current_length(), 3);
    Ok(())
}

#[test]
fn test_transform_drops_are_counted_and_dead_lettered() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let a = write_fixture_lines(tmp.path().join("a.txt"), &["a b c", "a b", "x y z", "boom"])?;

    let events = MemorySink::new();
    let dead = Arc::new(MemoryDeadLetters::new());
    let mut source = Source::new("triples", FileMedium::open([&a])?)
        .with_events(events.clone())
        .with_dead_letters(dead.clone())
        .with_transform(|r: Record| {
            let line = r.as_scalar().unwrap_or_default().trim_end().to_string();
            if line == "boom" {
                return Err(TransformError::Failed(anyhow::anyhow!("exploded")));
            }
            let fields: Vec<String> = line.split(' ').map(str::to_string).collect();
            if fields.len() != 3 {
                return Err(TransformError::ShapeMismatch(format!("{} fields", fields.len())));
            }
            Ok(Record::Fields(fields))
        });

    let out: Vec<Record> = source.by_ref().collect::<Result<_>>()?;
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].as_fields().unwrap(), ["x", "y", "z"]);

    let drops = source.drops();
    assert_eq!(drops.get(DropReason::ShapeMismatch), 1);
    assert_eq!(drops.get(DropReason::TransformFailed), 1);
    assert_eq!(drops.total(), 2);
    assert_eq!(source.current_length(), 4);

    let letters = dead.letters();
    assert_eq!(letters.len(), 2);
    assert!(letters.iter().all(|l| l.stage == Stage::Source));
    assert_eq!(letters[1].detail, "exploded");

    let dropped_events =
        events.count_where(|e| matches!(e, ShuffleEvent::RecordDropped { .. }));
    assert_eq!(dropped_events, 2);
    assert_eq!(
        events.count_where(|e| matches!(e, ShuffleEvent::SourceExhausted { length: 4, .. })),
        1
    );
    Ok(())
}

#[test]
fn test_transform_cancellation_aborts_and_fuses() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let a = write_fixture_lines(tmp.path().join("a.txt"), &["1", "2", "stop", "4"])?;

    let mut source = Source::new("numbers", FileMedium::open([&a])?)
        .with_events(Arc::new(NullSink))
        .with_transform(|r: Record| {
            if r.as_scalar() == Some("stop\n") {
                Err(TransformError::Cancelled)
            } else {
                Ok(r)
            }
        });

    assert!(source.next().unwrap().is_ok());
    assert!(source.next().unwrap().is_ok());
    let err = source.next().unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(source.next().is_none());
    Ok(())
}

#[test]
fn test_cancellation_token_stops_source() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let a = write_fixture_lines(tmp.path().join("a.txt"), &["1", "2", "3"])?;

    let token = CancellationToken::new();
    let mut source = Source::new("numbers", FileMedium::open([&a])?)
        .with_events(Arc::new(NullSink))
        .with_cancellation(token.clone());

    assert!(source.next().unwrap().is_ok());
    token.cancel();
    assert!(matches!(source.next(), Some(Err(ShuffleError::Cancelled))));
    assert!(source.next().is_none());
    Ok(())
}

#[test]
fn test_progress_events_every_n_records() -> anyhow::Result<()> {
    let records: Vec<Record> = (0..10).map(|i| Record::from(i.to_string())).collect();
    let events = MemorySink::new();
    let source = Source::new("numbers", StoreMedium::new("mem", records.into_iter(), 10, 2))
        .with_events(events.clone())
        .with_progress_every(3);

    assert_eq!(source.count(), 10);
    let progress: Vec<u64> = events
        .events()
        .iter()
        .filter_map(|e| match e {
            ShuffleEvent::SourceProgress { length, .. } => Some(*length),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![3, 6, 9]);
    Ok(())
}
