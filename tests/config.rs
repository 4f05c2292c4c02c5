//! Tests for job configuration.

use ironshuffle::config::DEFAULT_MEM_LIMIT;
use ironshuffle::testing::write_fixture_lines;
use ironshuffle::*;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_builder_defaults() -> anyhow::Result<()> {
    let config = JobConfig::builder()
        .name("job")
        .input_path("in.txt")
        .output_path("out")
        .build()?;
    assert_eq!(config.mem_limit, DEFAULT_MEM_LIMIT);
    assert_eq!(config.delimiter, "\0");
    assert_eq!(config.sort_parallelism, 1);
    assert_eq!(config.input_kind, InputKind::File);
    let temp = config.temp_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(temp.starts_with("ironshuffle_"));
    Ok(())
}

#[test]
fn test_missing_fields_are_fatal() {
    let no_name = JobConfig::builder().input_path("a").output_path("b").build();
    assert!(matches!(no_name, Err(ShuffleError::Configuration(m)) if m.contains("name")));

    let no_inputs = JobConfig::builder().name("j").output_path("b").build();
    assert!(matches!(no_inputs, Err(ShuffleError::Configuration(m)) if m.contains("input_paths")));

    let no_outputs = JobConfig::builder().name("j").input_path("a").build();
    assert!(matches!(no_outputs, Err(ShuffleError::Configuration(m)) if m.contains("output_paths")));

    let zero_mem = JobConfig::builder()
        .name("j")
        .input_path("a")
        .output_path("b")
        .mem_limit(0)
        .build();
    assert!(matches!(zero_mem, Err(ShuffleError::Configuration(_))));
}

#[test]
fn test_store_kind_needs_no_input_paths() -> anyhow::Result<()> {
    let config = JobConfig::builder()
        .name("store job")
        .input_kind(InputKind::Store)
        .output_path("out")
        .build()?;
    assert!(matches!(
        config.open_file_source(),
        Err(ShuffleError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn test_from_json_file() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("job.json");
    let body = json!({
        "name": "from json",
        "input_paths": ["a.txt", "b/*.txt"],
        "output_paths": ["/mnt/a", "/mnt/b"],
        "temp_path": "/tmp/job",
        "mem_limit": 1024,
        "sort_parallelism": 4
    });
    std::fs::write(&path, serde_json::to_string_pretty(&body)?)?;

    let config = JobConfig::from_json_file(&path)?;
    assert_eq!(config.name, "from json");
    assert_eq!(config.input_paths.len(), 2);
    assert_eq!(config.output_paths[1], PathBuf::from("/mnt/b"));
    assert_eq!(config.temp_path, PathBuf::from("/tmp/job"));
    assert_eq!(config.mem_limit, 1024);
    assert_eq!(config.sort_parallelism, 4);
    assert_eq!(config.delimiter, "\0");
    Ok(())
}

#[test]
fn test_from_json_rejects_missing_outputs() {
    let err = JobConfig::from_json_str(r#"{"name": "x", "input_paths": ["a"]}"#).unwrap_err();
    assert!(matches!(err, ShuffleError::Configuration(_)));

    let err = JobConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ShuffleError::Json(_)));
}

#[test]
fn test_shard_count_for() -> anyhow::Result<()> {
    let config = JobConfig::builder()
        .name("j")
        .input_path("a")
        .output_path("b")
        .mem_limit(100)
        .build()?;
    assert_eq!(config.shard_count_for(0), 1);
    assert_eq!(config.shard_count_for(100), 1);
    assert_eq!(config.shard_count_for(101), 2);
    assert_eq!(config.shard_count_for(1_000), 10);
    Ok(())
}

#[test]
fn test_open_file_source_resolves_globs() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    write_fixture_lines(tmp.path().join("b.log"), &["2"])?;
    write_fixture_lines(tmp.path().join("a.log"), &["1"])?;
    write_fixture_lines(tmp.path().join("skip.txt"), &["x"])?;

    let config = JobConfig::builder()
        .name("logs")
        .input_path(tmp.path().join("*.log"))
        .output_path(tmp.path().join("out"))
        .build()?;
    let source = config.open_file_source()?;
    assert_eq!(source.name(), "logs");
    assert_eq!(
        source.medium().paths(),
        [tmp.path().join("a.log"), tmp.path().join("b.log")]
    );
    assert_eq!(source.size(), 4);
    Ok(())
}

#[test]
fn test_open_file_source_missing_inputs() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let config = JobConfig::builder()
        .name("missing")
        .input_path(tmp.path().join("*.nothing"))
        .output_path(tmp.path().join("out"))
        .build()?;
    assert!(matches!(
        config.open_file_source(),
        Err(ShuffleError::InputNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_ensure_temp_path() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let config = JobConfig::builder()
        .name("t")
        .input_path("a")
        .output_path("b")
        .temp_path(tmp.path().join("scratch/inner"))
        .build()?;
    assert!(config.ensure_temp_path()?.is_dir());
    Ok(())
}
