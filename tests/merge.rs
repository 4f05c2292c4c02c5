//! Tests for the k-way merge over sorted shards.

use ironshuffle::testing::{assert_sorted_by, first_token, write_fixture_lines};
use ironshuffle::*;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn sorted_sorter(tmp: &TempDir, shards: &[&[&str]]) -> anyhow::Result<Sorter<String>> {
    let paths: Vec<PathBuf> = shards
        .iter()
        .enumerate()
        .map(|(i, lines)| write_fixture_lines(tmp.path().join(format!("m_{}", i + 1)), *lines))
        .collect::<Result<_>>()?;
    let mut sorter = Sorter::new(paths, first_token).with_events(Arc::new(NullSink));
    sorter.sort()?;
    Ok(sorter)
}

#[test]
fn test_merge_before_sort_is_invalid() {
    let sorter = Sorter::new(vec![PathBuf::from("unused")], first_token);
    assert!(matches!(sorter.merge(), Err(ShuffleError::InvalidState(_))));
}

#[test]
fn test_merge_is_globally_sorted() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let sorter = sorted_sorter(
        &tmp,
        &[&["d 1", "a 1", "g 1"], &["c 1", "b 1"], &["f 1", "e 1", "h 1", "a 2"]],
    )?;
    let merged: Vec<String> = sorter.merge()?.collect::<Result<_>>()?;
    assert_eq!(merged.len(), 9);
    assert_sorted_by(&merged, first_token);
    assert_eq!(merged[0], "a 1");
    assert_eq!(merged[8], "h 1");
    Ok(())
}

#[test]
fn test_equal_keys_ordered_by_shard_then_file_order() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let sorter = sorted_sorter(&tmp, &[&["k s0a", "k s0b"], &["k s1a"], &["k s2a", "j s2"]])?;
    let merged: Vec<String> = sorter.merge()?.collect::<Result<_>>()?;
    assert_eq!(merged, vec!["j s2", "k s0a", "k s0b", "k s1a", "k s2a"]);
    Ok(())
}

#[test]
fn test_keyed_and_groups() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let sorter = sorted_sorter(&tmp, &[&["b 1", "a 1"], &["a 2", "c 1", "b 2"]])?;

    let keys: Vec<String> = sorter
        .merge()?
        .keyed()
        .map(|kv| kv.map(|(k, _)| k))
        .collect::<Result<_>>()?;
    assert_eq!(keys, vec!["a", "a", "b", "b", "c"]);

    let groups: Vec<(String, Vec<String>)> = sorter.merge()?.groups().collect::<Result<_>>()?;
    assert_eq!(
        groups,
        vec![
            ("a".to_string(), vec!["a 1".to_string(), "a 2".to_string()]),
            ("b".to_string(), vec!["b 1".to_string(), "b 2".to_string()]),
            ("c".to_string(), vec!["c 1".to_string()]),
        ]
    );
    Ok(())
}

#[test]
fn test_exhausted_readers_are_closed() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let sorter = sorted_sorter(&tmp, &[&["a 1"], &["b 1", "c 1"]])?;
    let mut merge = sorter.merge()?;
    assert_eq!(merge.open_readers(), 2);

    assert_eq!(merge.next().transpose()?, Some("a 1".to_string()));
    // shard 0 had a single line and is now drained
    assert_eq!(merge.open_readers(), 1);

    assert_eq!(merge.by_ref().count(), 2);
    assert_eq!(merge.open_readers(), 0);
    assert!(merge.next().is_none());
    assert_eq!(merge.emitted(), 3);
    Ok(())
}

#[test]
fn test_merge_drops_unkeyed_lines() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let dead = Arc::new(MemoryDeadLetters::new());
    let paths = vec![
        write_fixture_lines(tmp.path().join("u_1"), &["b 1", "", "a 1"])?,
        write_fixture_lines(tmp.path().join("u_2"), &["c 1"])?,
    ];
    let mut sorter = Sorter::new(paths, first_token)
        .with_events(Arc::new(NullSink))
        .with_dead_letters(dead.clone());
    sorter.sort()?;

    let mut merge = sorter.merge()?;
    let merged: Vec<String> = merge.by_ref().collect::<Result<_>>()?;
    assert_eq!(merged, vec!["a 1", "b 1", "c 1"]);
    assert_eq!(merge.drops().get(DropReason::KeyExtraction), 1);

    let letters = dead.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].stage, Stage::Merge);
    assert_eq!(letters[0].record, "");
    Ok(())
}

#[test]
fn test_cancellation_closes_every_reader() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let token = CancellationToken::new();
    let paths = vec![
        write_fixture_lines(tmp.path().join("c_1"), &["a 1", "b 1"])?,
        write_fixture_lines(tmp.path().join("c_2"), &["a 2", "b 2"])?,
    ];
    let mut sorter = Sorter::new(paths, first_token)
        .with_events(Arc::new(NullSink))
        .with_cancellation(token.clone());
    sorter.sort()?;

    let mut merge = sorter.merge()?;
    assert!(merge.next().unwrap().is_ok());
    token.cancel();
    assert!(matches!(merge.next(), Some(Err(ShuffleError::Cancelled))));
    assert_eq!(merge.open_readers(), 0);
    assert!(merge.next().is_none());
    Ok(())
}

#[test]
fn test_merge_progress_and_finish_events() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let events = MemorySink::new();
    let lines: Vec<String> = (0..10).map(|i| format!("k{i:02} x")).collect();
    let path = write_fixture_lines(tmp.path().join("p_1"), &lines)?;
    let mut sorter = Sorter::new(vec![path], first_token)
        .with_events(events.clone())
        .with_progress_every(4);
    sorter.sort()?;
    assert_eq!(sorter.merge()?.count(), 10);

    let progress: Vec<(u64, Option<f64>)> = events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ShuffleEvent::MergeProgress { emitted, percent } => Some((emitted, percent)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(4, Some(40.0)), (8, Some(80.0))]);
    assert_eq!(
        events.count_where(|e| matches!(e, ShuffleEvent::MergeFinished { emitted: 10, total_lines: 10, .. })),
        1
    );
    Ok(())
}
