use border_buffer::{
    batch, load_buffer, AnyBuffer, BufferError, BufferKind, CachedReplayBuffer, ListReplayBuffer,
    PerConfig, ReplayBuffer, ReplayBufferBase, ReplayBufferConfig, ReplayBufferManager, Result,
    Transition,
};
use tempdir::TempDir;

fn filled(config: &ReplayBufferConfig, n: i64) -> Result<ReplayBuffer> {
    let mut buf = ReplayBuffer::build(config)?;
    for i in 0..n {
        buf.add_transition(
            Transition::new(vec![i as f64, -i as f64], i, 0.5)
                .terminated(i % 4 == 3)
                .info(batch! { "step" => i, "tag" => "x" }),
        )?;
    }
    Ok(buf)
}

#[test_log::test]
fn plain_buffer_round_trip() -> Result<()> {
    let dir = TempDir::new("persist")?;
    let path = dir.path().join("buf.bin");
    let config = ReplayBufferConfig::default().capacity(7).stack_num(2);
    let buf = filled(&config, 10)?;
    buf.save(&path)?;

    let loaded = ReplayBuffer::load(&path)?;
    assert_eq!(loaded.len(), buf.len());
    assert_eq!(loaded.maxsize(), buf.maxsize());
    assert_eq!(loaded.config(), buf.config());
    assert_eq!(loaded.meta(), buf.meta());
    assert_eq!(loaded.valid_index(), buf.valid_index());
    assert_eq!(loaded.get_item(..)?, buf.get_item(..)?);

    // the write cursor survives
    let mut loaded = loaded;
    assert_eq!(loaded.add_transition(Transition::new(vec![0.0, 0.0], 0, 0.0))?.ptr, 3);

    assert!(matches!(
        ReplayBufferManager::load(&path),
        Err(BufferError::Serialization(_))
    ));
    Ok(())
}

#[test_log::test]
fn prioritized_buffer_round_trip() -> Result<()> {
    let dir = TempDir::new("persist")?;
    let path = dir.path().join("per.bin");
    let config = ReplayBufferConfig::default()
        .capacity(8)
        .per_config(Some(PerConfig::default().alpha(0.6).beta(0.4)));
    let mut buf = filled(&config, 5)?;
    buf.update_weight(&[1, 3], &[2.0, 0.1])?;
    buf.save(&path)?;

    match load_buffer(&path)? {
        AnyBuffer::Plain(loaded) => {
            assert_eq!(loaded.kind(), BufferKind::PrioritizedReplayBuffer);
            assert_eq!(loaded.weight(0..8)?, buf.weight(0..8)?);
            assert_eq!(
                loaded.get_item(vec![0, 1, 3])?.get("weight"),
                buf.get_item(vec![0, 1, 3])?.get("weight")
            );
        }
        _ => panic!("expected a plain buffer"),
    }
    Ok(())
}

#[test_log::test]
fn composed_buffers_round_trip() -> Result<()> {
    let dir = TempDir::new("persist")?;
    let rew = ndarray::Array2::from_elem((3, 2), 0.5);
    let rows = batch! {
        "obs" => vec![0, 1, 2],
        "act" => vec![0, 1, 2],
        "rew" => rew,
        "done" => vec![false, false, true],
        "info" => batch! { "n" => vec![3, 4, 5] },
    };

    let mut vector = ReplayBufferManager::vector(30, 3, &ReplayBufferConfig::default())?;
    let mut cached = CachedReplayBuffer::new(
        ReplayBuffer::build(&ReplayBufferConfig::default().capacity(20))?,
        3,
        10,
    )?;
    for _ in 0..4 {
        vector.add(&rows, Some(&[0, 1, 2]))?;
        cached.add(&rows, Some(&[0, 1, 2]))?;
    }

    let path = dir.path().join("vector.bin");
    vector.save(&path)?;
    let loaded = ReplayBufferManager::load(&path)?;
    assert_eq!(loaded.buffer_num(), 3);
    assert_eq!(loaded.meta(), vector.meta());
    assert_eq!(loaded.unfinished_index(), vector.unfinished_index());
    assert_eq!(loaded.valid_index(), vector.valid_index());

    let path = dir.path().join("cached.bin");
    cached.save(&path)?;
    match load_buffer(&path)? {
        AnyBuffer::Cached(loaded) => {
            assert_eq!(loaded.buffer_num(), 3);
            assert_eq!(loaded.main_buffer().len(), cached.main_buffer().len());
            assert_eq!(loaded.meta(), cached.meta());
            assert_eq!(loaded.valid_index(), cached.valid_index());
        }
        other => panic!("expected a cached buffer, got {:?}", other.kind()),
    }
    Ok(())
}

#[test_log::test]
fn list_buffer_round_trip() -> Result<()> {
    let dir = TempDir::new("persist")?;
    let path = dir.path().join("list.bin");
    let mut buf = ListReplayBuffer::new();
    buf.add(batch! { "obs" => vec![1.0, 2.0], "rew" => 1.0 });
    buf.add(batch! { "obs" => vec![3.0], "rew" => 2.0, "note" => "short" });
    buf.save(&path)?;

    let loaded = ListReplayBuffer::load(&path)?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get_item(1)?, buf.get_item(1)?);
    assert!(matches!(load_buffer(&path)?, AnyBuffer::List(_)));
    Ok(())
}
