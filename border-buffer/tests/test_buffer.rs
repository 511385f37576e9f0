use border_buffer::{
    batch, Batch, BufferError, CachedReplayBuffer, PerConfig, ReplayBuffer, ReplayBufferBase,
    ReplayBufferConfig, ReplayBufferManager, Result, Transition, Value,
};
use ndarray::arr2;

/// Walks right from `start`; an episode ends when the position reaches
/// `size`, with reward 1 on that step.
struct Walk {
    size: i64,
    index: i64,
}

impl Walk {
    fn new(size: i64) -> Self {
        Self { size, index: 0 }
    }

    fn reset(&mut self, start: i64) -> i64 {
        self.index = start;
        self.index
    }

    fn step(&mut self) -> (i64, f64, bool) {
        self.index += 1;
        let done = self.index == self.size;
        (self.index, done as i64 as f64, done)
    }
}

fn windows(rows: &[[i64; 4]]) -> Value {
    Value::from(arr2(rows))
}

fn ints(v: &[i64]) -> Value {
    Value::from(v.to_vec())
}

fn bools(v: &[i64]) -> Value {
    Value::from(v.iter().map(|&x| x != 0).collect::<Vec<_>>())
}

fn stacked(obs: Vec<i64>, done: Vec<bool>) -> Batch {
    let n = obs.len();
    batch! {
        "obs" => obs.clone(), "act" => obs, "rew" => vec![1.0; n], "done" => done,
    }
}

#[test]
fn stack_windows_repeat_the_episode_start() -> Result<()> {
    let config = ReplayBufferConfig::default().capacity(9).stack_num(4);
    let mut buf = ReplayBuffer::build(&config)?;
    let mut avail = ReplayBuffer::build(&config.clone().sample_avail(true))?;
    let mut last = ReplayBuffer::build(&config.clone().save_only_last_obs(true))?;

    let mut env = Walk::new(5);
    let mut obs = env.reset(1);
    for _ in 0..16 {
        let (obs_next, rew, done) = env.step();
        buf.add_transition(Transition::new(obs, 1, rew).terminated(done))?;
        avail.add_transition(Transition::new(obs, 1, rew).terminated(done))?;
        last.add_transition(
            Transition::new(vec![0, 0, obs], 1, rew)
                .obs_next(vec![0, obs])
                .terminated(done),
        )?;
        obs = if done { env.reset(1) } else { obs_next };
    }

    let ix: Vec<usize> = (0..buf.len()).collect();
    let expected = windows(&[
        [1, 1, 1, 2], [1, 1, 2, 3], [1, 2, 3, 4],
        [1, 1, 1, 1], [1, 1, 1, 2], [1, 1, 2, 3],
        [1, 2, 3, 4], [4, 4, 4, 4], [1, 1, 1, 1],
    ]);
    assert_eq!(buf.get(&ix, "obs", None)?, expected);
    assert_eq!(last.get(&ix, "obs", None)?, expected);
    assert_eq!(last.get(&ix, "obs_next", None)?, expected);

    let (_, ix) = avail.sample(0)?;
    assert_eq!(ix, vec![2, 6]);
    let (_, ix) = avail.sample(1)?;
    assert!(ix[0] == 2 || ix[0] == 6);
    assert!(avail.sample_index(-1).is_empty());
    assert!(matches!(buf.get_item(18), Err(BufferError::Index(_))));
    Ok(())
}

fn masked(stack_num: usize) -> Result<ReplayBuffer> {
    let config = ReplayBufferConfig::default()
        .capacity(10)
        .ignore_obs_next(true)
        .stack_num(stack_num);
    let mut buf = ReplayBuffer::build(&config)?;
    for i in 0..10i64 {
        let obs = batch! {
            "mask1" => vec![i, 1, 1, 0, 0],
            "mask2" => vec![i + 4, 0, 1, 0, 0],
            "mask" => i,
        };
        let act = batch! { "act_id" => i, "position_id" => i + 3 };
        buf.add_transition(
            Transition::new(obs, act, i as f64)
                .done(i % 3 == 0)
                .info(batch! { "if" => i }),
        )?;
    }
    Ok(buf)
}

fn field(b: &Batch, key: &str, sub: &str) -> Value {
    b.get(key)
        .and_then(Value::as_batch)
        .and_then(|b| b.get(sub))
        .cloned()
        .unwrap_or_else(|| Value::Batch(Batch::new()))
}

#[test]
fn ignored_obs_next_reads_the_next_observation() -> Result<()> {
    let buf = masked(1)?;
    let data = buf.get_item(0..10)?;
    assert_eq!(field(&data, "obs_next", "mask"), ints(&[0, 2, 3, 3, 5, 6, 6, 8, 9, 9]));
    assert!(buf.meta().obs_next().is_none());

    let buf = masked(4)?;
    let data = buf.get_item(0..10)?;
    assert_eq!(
        field(&data, "obs_next", "mask"),
        Value::from(arr2(&[
            [0i64, 0, 0, 0], [1, 1, 1, 2], [1, 1, 2, 3], [1, 1, 2, 3],
            [4, 4, 4, 5], [4, 4, 5, 6], [4, 4, 5, 6],
            [7, 7, 7, 8], [7, 7, 8, 9], [7, 7, 8, 9],
        ]))
    );
    assert_eq!(
        field(&data, "info", "if"),
        Value::from(arr2(&[
            [0i64, 0, 0, 0], [1, 1, 1, 1], [1, 1, 1, 2], [1, 1, 2, 3],
            [4, 4, 4, 4], [4, 4, 4, 5], [4, 4, 5, 6],
            [7, 7, 7, 7], [7, 7, 7, 8], [7, 7, 8, 9],
        ]))
    );
    // actions are never stacked
    assert_eq!(field(&data, "act", "act_id"), ints(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
    Ok(())
}

#[test]
fn update_copies_valid_transitions_oldest_first() -> Result<()> {
    let config = ReplayBufferConfig::default().capacity(4).stack_num(2);
    let mut buf1 = ReplayBuffer::build(&config)?;
    let mut buf2 = ReplayBuffer::build(&config)?;
    for i in 0..5i64 {
        buf1.add_transition(
            Transition::new(vec![i], i as f64, (i * i) as f64)
                .done(i % 2 == 0)
                .info(batch! { "incident" => "found" }),
        )?;
    }
    assert!(buf1.len() > buf2.len());
    buf2.update(&buf1)?;
    assert_eq!(buf1.len(), buf2.len());
    assert_eq!(buf2.get_item(0)?.obs(), buf1.get_item(1)?.obs());
    assert_eq!(buf2.get(&[3], "obs", Some(1))?, buf1.get(&[0], "obs", Some(1))?);

    let mut cached = CachedReplayBuffer::new(ReplayBuffer::build(&config.capacity(10))?, 4, 5)?;
    assert!(matches!(cached.update(&buf1), Err(BufferError::NotSupported(_))));
    Ok(())
}

#[test]
fn manager_steps_within_each_child() -> Result<()> {
    let children = (0..4)
        .map(|_| ReplayBuffer::build(&ReplayBufferConfig::default().capacity(5)))
        .collect::<Result<Vec<_>>>()?;
    let mut buf = ReplayBufferManager::new(children)?;

    let out = buf.add(&stacked(vec![1, 2, 3], vec![false, false, true]), Some(&[0, 1, 2]))?;
    assert_eq!(out.iter().map(|o| o.ep_len).collect::<Vec<_>>(), vec![0, 0, 1]);
    assert_eq!(out[2].ep_rew.sum(), 1.0);
    assert!(matches!(
        buf.update(&ReplayBuffer::build(&ReplayBufferConfig::default())?),
        Err(BufferError::NotSupported(_))
    ));

    let ix = buf.sample_index(11000);
    for g in [0, 5, 10].iter() {
        assert!(ix.iter().filter(|&i| i == g).count() >= 3000);
    }
    let (_, ix) = buf.sample(0)?;
    assert_eq!(ix, vec![0, 5, 10]);
    assert_eq!(buf.prev(ix.clone()), ix);
    assert_eq!(buf.next(ix.clone()), ix);
    assert_eq!(buf.unfinished_index(), vec![0, 5]);

    buf.add(&stacked(vec![4], vec![true]), Some(&[3]))?;
    assert_eq!(buf.unfinished_index(), vec![0, 5]);
    assert_eq!(buf.sample_index(0), vec![0, 5, 10, 15]);

    let ids = [0, 1, 2, 3];
    buf.add(&stacked(vec![0; 4], vec![false; 4]), Some(&ids))?;
    buf.add(&stacked(vec![0; 4], vec![true; 4]), Some(&ids))?;
    assert_eq!(buf.len(), 12);
    buf.add(&stacked(vec![0; 4], vec![false; 4]), Some(&ids))?;
    buf.add(&stacked(vec![0; 4], vec![false, true, false, true]), Some(&ids))?;
    assert_eq!(buf.len(), 20);
    let ix = buf.sample_index(0);
    assert_eq!(ix, (0..20).collect::<Vec<_>>());

    assert_eq!(
        buf.meta().done().unwrap(),
        &bools(&[0, 0, 1, 0, 0, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 0, 1])
    );
    assert_eq!(
        buf.prev(ix.clone()),
        vec![0, 0, 1, 3, 3, 5, 5, 6, 8, 8, 10, 11, 11, 13, 13, 15, 16, 16, 18, 18]
    );
    assert_eq!(
        buf.next(ix.clone()),
        vec![1, 2, 2, 4, 4, 6, 7, 7, 9, 9, 10, 12, 12, 14, 14, 15, 17, 17, 19, 19]
    );
    assert_eq!(buf.unfinished_index(), vec![4, 14]);

    let out = buf.add(&stacked(vec![1], vec![true]), Some(&[2]))?;
    assert_eq!(out[0].ep_len, 3);
    assert_eq!(out[0].ep_rew.sum(), 3.0);
    assert_eq!(buf.unfinished_index(), vec![4]);
    let mut ix = buf.sample_index(0);
    ix.sort_unstable();
    assert_eq!(
        buf.prev(ix.clone()),
        vec![0, 0, 1, 3, 3, 5, 5, 6, 8, 8, 14, 11, 11, 13, 13, 15, 16, 16, 18, 18]
    );
    assert_eq!(
        buf.next(ix),
        vec![1, 2, 2, 4, 4, 6, 7, 7, 9, 9, 10, 12, 12, 14, 10, 15, 17, 17, 19, 19]
    );
    assert_eq!(buf.prev(-1), buf.prev(vec![19]));
    assert_eq!(buf.next(-1), buf.next(vec![19]));

    let mut meta = buf.meta().clone();
    meta.insert("info", batch! { "n" => vec![1.0; 20] });
    buf.set_batch(meta)?;
    assert_eq!(
        buf.buffers()[3].column("info")?.as_batch().and_then(|b| b.get("n")).cloned(),
        Some(Value::from(vec![1.0; 5]))
    );
    assert!(buf.sample_index(-1).is_empty());
    Ok(())
}

#[test]
fn cached_buffer_moves_closed_episodes() -> Result<()> {
    let main = ReplayBuffer::build(&ReplayBufferConfig::default().capacity(10))?;
    let mut buf = CachedReplayBuffer::new(main, 4, 5)?;
    assert!(buf.sample_index(0).is_empty());

    let out = buf.add(&stacked(vec![1], vec![false]), Some(&[1]))?;
    assert_eq!((out[0].ep_len, out[0].ep_rew.sum()), (0, 0.0));
    let ix = buf.sample_index(0);
    assert_eq!(ix, vec![15]);
    assert_eq!(buf.prev(ix.clone()), vec![15]);
    assert_eq!(buf.next(ix), vec![15]);

    let out = buf.add(&stacked(vec![2], vec![true]), Some(&[3]))?;
    assert_eq!((out[0].ep_len, out[0].ep_rew.sum()), (1, 1.0));
    let ix = buf.sample_index(0);
    assert_eq!(ix, vec![0, 15]);
    assert_eq!(buf.prev(ix.clone()), vec![0, 15]);
    assert_eq!(buf.next(ix), vec![0, 15]);
    assert_eq!(buf.unfinished_index(), vec![15]);

    let out = buf.add(&stacked(vec![3, 4], vec![false, true]), Some(&[3, 1]))?;
    assert_eq!(out.iter().map(|o| o.ep_len).collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(out[1].ep_rew.sum(), 2.0);
    let mut obs = vec![0i64; 30];
    for &(g, v) in [(0, 2), (1, 1), (2, 4), (15, 1), (16, 4), (25, 3)].iter() {
        obs[g] = v;
    }
    assert_eq!(buf.meta().obs().unwrap(), &ints(&obs));
    assert_eq!(buf.unfinished_index(), vec![25]);

    let ix = buf.sample_index(0);
    assert_eq!(ix, vec![0, 1, 2, 25]);
    assert_eq!(buf.get(&ix, "done", None)?, bools(&[1, 0, 1, 0]));
    assert_eq!(buf.prev(ix.clone()), vec![0, 1, 1, 25]);
    assert_eq!(buf.next(ix), vec![0, 2, 2, 25]);

    let ix = buf.sample_index(10000);
    for g in [0, 1, 2, 25].iter() {
        assert!(ix.iter().filter(|&i| i == g).count() > 2000);
    }
    Ok(())
}

#[test]
fn cache_only_mode_keeps_recent_steps() -> Result<()> {
    let main = ReplayBuffer::build(
        &ReplayBufferConfig::default().capacity(0).sample_avail(true),
    )?;
    let mut buf = CachedReplayBuffer::new(main, 4, 5)?;
    let flags = [
        [false, false, true, true],
        [false, false, false, false],
        [true, true, true, true],
        [false, false, false, false],
        [false, true, false, true],
    ];
    for done in flags.iter() {
        let rows = batch! {
            "obs" => vec![0.0; 4], "act" => vec![0.0; 4],
            "rew" => ndarray::Array2::<f64>::ones((4, 4)),
            "done" => done.to_vec(), "obs_next" => vec![0.0; 4],
        };
        buf.add(&rows, None)?;
    }
    assert_eq!(
        buf.meta().done().unwrap(),
        &bools(&[0, 0, 1, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0])
    );
    let ix = buf.sample_index(0);
    assert_eq!(ix, vec![0, 1, 10, 11]);
    assert_eq!(buf.prev(ix.clone()), vec![0, 0, 10, 10]);
    assert_eq!(buf.next(ix), vec![1, 1, 11, 11]);
    Ok(())
}

#[test]
fn cached_buffers_stack_by_episode() -> Result<()> {
    let (size, bufsize, stack_num, cached_num) = (5i64, 9, 4, 3);
    let config = ReplayBufferConfig::default()
        .capacity(bufsize)
        .stack_num(stack_num)
        .ignore_obs_next(true);
    let mut buf4 = CachedReplayBuffer::new(ReplayBuffer::build(&config)?, cached_num, size as usize)?;
    let per_config = config
        .clone()
        .sample_avail(true)
        .per_config(Some(PerConfig::default().alpha(0.6).beta(0.4)));
    let mut buf5 = CachedReplayBuffer::new(ReplayBuffer::build(&per_config)?, cached_num, size as usize)?;

    let mut env = Walk::new(size);
    let mut obs = env.reset(1);
    for _ in 0..18 {
        let (obs_next, rew, done) = env.step();
        let obs_list: Vec<i64> = (0..cached_num as i64).map(|i| obs + size * i).collect();
        let rows = batch! {
            "obs" => obs_list.clone(),
            "act" => vec![1; cached_num],
            "rew" => vec![rew; cached_num],
            "done" => vec![done; cached_num],
            "obs_next" => obs_list.iter().map(|o| -o).collect::<Vec<_>>(),
            "info" => batch! { "k" => vec![1; cached_num] },
        };
        buf4.add(&rows, None)?;
        buf5.add(&rows, None)?;
        obs = if done { env.reset(1) } else { obs_next };
    }

    assert_eq!(
        buf4.meta().obs().unwrap(),
        &ints(&[
            12, 13, 14, 4, 6, 7, 8, 9, 11, // main
            1, 2, 3, 4, 0, // cache 0
            6, 7, 8, 9, 0, // cache 1
            11, 12, 13, 14, 0, // cache 2
        ])
    );
    assert_eq!(
        buf4.meta().done().unwrap(),
        &bools(&[
            0, 0, 1, 1, 0, 0, 0, 1, 0, //
            0, 0, 0, 1, 0, //
            0, 0, 0, 1, 0, //
            0, 0, 0, 1, 0,
        ])
    );
    assert_eq!(buf4.unfinished_index(), vec![10, 15, 20]);

    let mut ix = buf4.sample_index(0);
    ix.sort_unstable();
    assert_eq!(ix, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 14, 15, 19, 20]);
    let data = buf4.get_item(ix)?;
    assert_eq!(
        data.obs().unwrap(),
        &windows(&[
            [11, 11, 11, 12], [11, 11, 12, 13], [11, 12, 13, 14],
            [4, 4, 4, 4], [6, 6, 6, 6], [6, 6, 6, 7],
            [6, 6, 7, 8], [6, 7, 8, 9], [11, 11, 11, 11],
            [1, 1, 1, 1], [1, 1, 1, 2], [6, 6, 6, 6],
            [6, 6, 6, 7], [11, 11, 11, 11], [11, 11, 11, 12],
        ])
    );
    assert_eq!(
        data.obs_next().unwrap(),
        &windows(&[
            [11, 11, 12, 13], [11, 12, 13, 14], [11, 12, 13, 14],
            [4, 4, 4, 4], [6, 6, 6, 7], [6, 6, 7, 8],
            [6, 7, 8, 9], [6, 7, 8, 9], [11, 11, 11, 12],
            [1, 1, 1, 2], [1, 1, 1, 2], [6, 6, 6, 7],
            [6, 6, 6, 7], [11, 11, 11, 12], [11, 11, 11, 12],
        ])
    );

    assert_eq!(buf4.meta().done(), buf5.meta().done());
    let mut ix = buf5.sample_index(0);
    ix.sort_unstable();
    assert_eq!(ix, vec![2, 7]);
    assert!(buf5.sample_index(100).iter().all(|i| ix.contains(i)));

    let valid = buf5.valid_index();
    let weight = buf5.get_item(valid.clone())?.get("weight").cloned();
    assert_eq!(weight, Some(Value::from(vec![1.0; valid.len()])));

    // zero priorities become eps, the new minimum, which has weight 1
    buf5.update_weight(&[0, 1, 2, 5, 6, 7], &[0.0; 6])?;
    let all: Vec<usize> = (0..9).chain(vec![9, 10, 14, 15, 19, 20]).collect();
    let weight: Vec<f64> = buf5
        .get_item(all)?
        .get("weight")
        .map(|w| w.to_f64())
        .transpose()?
        .map(|w| w.iter().copied().collect())
        .unwrap_or_default();
    let modified: Vec<f64> = [0, 1, 2, 5, 6, 7].iter().map(|&i| weight[i]).collect();
    let unmodified: Vec<f64> = [3, 4, 8].iter().map(|&i| weight[i]).collect();
    assert!(modified.iter().all(|&w| (w - 1.0).abs() < 1e-9));
    assert!(unmodified.iter().all(|&w| w == unmodified[0] && w < 1.0));
    assert!(weight[9..].iter().all(|&w| w == unmodified[0]));
    Ok(())
}

#[test]
fn cached_buffer_keeps_only_the_last_frame() -> Result<()> {
    let config = ReplayBufferConfig::default()
        .capacity(9)
        .stack_num(4)
        .save_only_last_obs(true)
        .ignore_obs_next(true);
    let mut buf = CachedReplayBuffer::new(ReplayBuffer::build(&config)?, 3, 5)?;
    let frames = |k: f64| ndarray::Array3::<f64>::from_elem((4, 2, 2), k);
    let mut first = frames(0.0);
    first.slice_mut(ndarray::s![3, .., ..]).fill(1.0);
    let mut second = frames(0.0);
    second.slice_mut(ndarray::s![3, .., ..]).fill(3.0);
    let rows = batch! {
        "obs" => ndarray::stack(ndarray::Axis(0), &[second.view(), first.view()]).unwrap(),
        "act" => vec![1, 1],
        "rew" => vec![0.0, 0.0],
        "done" => vec![false, true],
    };
    buf.add(&rows, Some(&[1, 2]))?;

    let obs = buf.meta().obs().unwrap().to_f64()?;
    assert_eq!(obs.shape(), &[24, 2, 2]);
    assert!(obs.index_axis(ndarray::Axis(0), 0).iter().all(|&x| x == 1.0));
    assert!(obs.index_axis(ndarray::Axis(0), 14).iter().all(|&x| x == 3.0));
    assert!(obs.index_axis(ndarray::Axis(0), 19).iter().all(|&x| x == 1.0));
    assert_eq!(buf.get_item(0)?.obs().unwrap().shape(), Some(vec![4, 2, 2]));
    Ok(())
}

#[test]
fn prioritized_weights_follow_updates() -> Result<()> {
    let config = ReplayBufferConfig::default()
        .capacity(15)
        .per_config(Some(PerConfig::default().alpha(0.5).beta(0.5)));
    let mut buf = ReplayBuffer::build(&config)?;
    let mut env = Walk::new(32);
    let mut obs = env.reset(0);
    for i in 0..25usize {
        let (obs_next, rew, done) = env.step();
        buf.add_with_weight(
            Transition::new(obs, 1, rew).terminated(done),
            (i as f64 * 0.37).sin() - 0.5,
        )?;
        obs = obs_next;
        let n = buf.len() / 2;
        let (data, _) = buf.sample(n as isize)?;
        if n == 0 {
            assert_eq!(data.len()?, buf.len());
        } else {
            assert_eq!(data.len()?, n);
        }
        assert_eq!(buf.len(), 15.min(i + 1));
    }

    let (data, ix) = buf.sample((buf.len() / 2) as isize)?;
    let weight = data.get("weight").unwrap().to_f64()?;
    let half: Vec<f64> = weight.iter().map(|w| -w / 2.0).collect();
    buf.update_weight(&ix, &half)?;
    let stored = buf.weight(ix.clone())?;
    for (i, &g) in ix.iter().enumerate() {
        // a repeated index keeps the last update
        let last = ix.iter().rposition(|&h| h == g).unwrap_or(i);
        let expected = (half[last].abs() + f32::EPSILON as f64).powf(0.5);
        assert!((stored[i] - expected).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn least_priority_weighs_one_when_priorities_exceed_one() -> Result<()> {
    let config = ReplayBufferConfig::default()
        .capacity(3)
        .per_config(Some(PerConfig::default().alpha(0.5).beta(0.5)));
    let mut buf = ReplayBuffer::build(&config)?;
    for i in 0..3 {
        buf.add_transition(Transition::new(i, 0, 1.0))?;
    }
    buf.update_weight(&[0, 1, 2], &[4.0, 9.0, 16.0])?;
    let weight: Vec<f64> = buf.get_item(vec![0, 1, 2])?.get("weight").unwrap().to_f64()?.iter().copied().collect();
    assert!((weight[0] - 1.0).abs() < 1e-6);
    assert!(weight[1] < 1.0 && weight[2] < weight[1]);

    // overwriting the minimum moves it to the next smallest priority
    buf.add_with_weight(Transition::new(3, 0, 1.0), 25.0)?;
    let weight = buf.get_item(1)?.get("weight").unwrap().item()?;
    assert!((weight - 1.0).abs() < 1e-6);
    Ok(())
}
