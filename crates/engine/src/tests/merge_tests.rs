use super::helpers::{test_config, test_key, test_value};
use crate::{Config, Engine, Error};
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

fn merge_config(dir: &std::path::Path) -> Config {
    let mut config = test_config(dir);
    // Small files so merges span several of them; ratio 0 so every test can
    // trigger a merge at will.
    config.file_size = 4 * 1024;
    config.merge_ratio = 0.0;
    config
}

// --------------------- Preconditions ---------------------

#[test]
fn merge_on_empty_engine_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(merge_config(dir.path()))?;
    engine.merge()?;
    Ok(())
}

#[test]
fn merge_below_ratio_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let mut config = merge_config(dir.path());
    config.merge_ratio = 0.9;
    let engine = Engine::open(config)?;

    for n in 0..50 {
        engine.put(&test_key(n), &test_value(n))?;
    }
    // Nothing was overwritten, so almost nothing is reclaimable.
    assert!(matches!(engine.merge(), Err(Error::MergeRatioUnreached)));
    Ok(())
}

// --------------------- Full merge cycle ---------------------

#[test]
fn merge_preserves_latest_values_and_drops_reclaim() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        for n in 0..1000 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        // Overwrite everything once: half the log is now dead weight.
        for n in 0..1000 {
            engine.put(&test_key(n), &test_value(n + 1))?;
        }
        engine.merge()?;
        engine.close()?;
    }

    let engine = Engine::open(merge_config(dir.path()))?;
    assert_eq!(engine.len()?, 1000);
    for n in 0..1000 {
        assert_eq!(engine.get(&test_key(n))?, test_value(n + 1));
    }
    assert_eq!(engine.stat()?.reclaimable_size, 0);
    Ok(())
}

#[test]
fn merge_drops_deleted_keys() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        for n in 0..200 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        for n in 0..100 {
            engine.delete(&test_key(n))?;
        }
        engine.merge()?;
        engine.close()?;
    }

    let engine = Engine::open(merge_config(dir.path()))?;
    assert_eq!(engine.len()?, 100);
    assert!(matches!(engine.get(&test_key(0)), Err(Error::KeyNotFound)));
    assert_eq!(engine.get(&test_key(150))?, test_value(150));
    Ok(())
}

#[test]
fn writes_after_merge_land_in_new_active_file() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        for n in 0..100 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        engine.merge()?;
        // The merge snapshot excluded the fresh active file; these writes
        // must survive installation untouched.
        for n in 100..150 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        engine.close()?;
    }

    let engine = Engine::open(merge_config(dir.path()))?;
    assert_eq!(engine.len()?, 150);
    assert_eq!(engine.get(&test_key(0))?, test_value(0));
    assert_eq!(engine.get(&test_key(149))?, test_value(149));
    Ok(())
}

#[test]
fn merged_batch_records_replay_without_txn_framing() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        let batch = engine.new_write_batch(crate::WriteBatchConfig::default());
        for n in 0..50 {
            batch.put(&test_key(n), &test_value(n))?;
        }
        batch.commit()?;
        engine.merge()?;
        engine.close()?;
    }

    let engine = Engine::open(merge_config(dir.path()))?;
    for n in 0..50 {
        assert_eq!(engine.get(&test_key(n))?, test_value(n));
    }
    Ok(())
}

#[test]
fn hint_file_is_written_by_merge() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        for n in 0..100 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        engine.merge()?;
        engine.close()?;
    }
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        engine.close()?;
    }
    // Installed into the main directory on reopen.
    assert!(dir.path().join("hint-index").exists());
    assert!(dir.path().join("merge-finished").exists());
    Ok(())
}

// --------------------- Crash safety of residue ---------------------

#[test]
fn markerless_merge_residue_is_discarded() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("db");
    {
        let mut config = merge_config(&db_path);
        config.merge_ratio = 0.5;
        let engine = Engine::open(config)?;
        engine.put(b"k", b"v")?;
        engine.close()?;
    }

    // A merge that died before its marker: stale sibling directory.
    let residue = dir.path().join("db-merge");
    fs::create_dir_all(&residue)?;
    fs::write(residue.join("000000000.data"), b"partial")?;

    let engine = Engine::open(merge_config(&db_path))?;
    assert!(!residue.exists());
    assert_eq!(engine.get(b"k")?, b"v");
    Ok(())
}

#[test]
fn second_merge_reuses_the_directory() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open(merge_config(dir.path()))?;
        for n in 0..100 {
            engine.put(&test_key(n), &test_value(n))?;
        }
        engine.merge()?;
        for n in 0..100 {
            engine.put(&test_key(n), &test_value(n + 7))?;
        }
        // The first merge's output is still sitting in the sibling
        // directory; a second merge must replace it wholesale.
        engine.merge()?;
        engine.close()?;
    }

    let engine = Engine::open(merge_config(dir.path()))?;
    assert_eq!(engine.len()?, 100);
    for n in 0..100 {
        assert_eq!(engine.get(&test_key(n))?, test_value(n + 7));
    }
    Ok(())
}

// --------------------- Backup ---------------------

#[test]
fn backup_excludes_lock_and_opens_cleanly() -> Result<()> {
    let dir = tempdir()?;
    let backup_dir = tempdir()?;
    let engine = Engine::open(test_config(dir.path()))?;
    for n in 0..50 {
        engine.put(&test_key(n), &test_value(n))?;
    }
    engine.backup(backup_dir.path())?;
    assert!(!backup_dir.path().join("flock").exists());

    // The source engine is still open; the copy opens independently.
    let restored = Engine::open(test_config(backup_dir.path()))?;
    for n in 0..50 {
        assert_eq!(restored.get(&test_key(n))?, test_value(n));
    }
    Ok(())
}
