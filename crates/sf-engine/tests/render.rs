//! End-to-end render scenarios over the loopback backend.

use sf_engine::{
    BufferChannels, ChannelLayout, Device, DeviceOptions, EffectKind, EffectProps, SampleBuffer,
    SampleType, SourceState, SpatializeMode, StreamConfig,
};
use std::sync::Arc;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stream(layout: ChannelLayout, frequency: u32, update_size: usize) -> StreamConfig {
    StreamConfig {
        frequency,
        layout,
        sample_type: SampleType::F32,
        update_size,
        num_updates: 1,
    }
}

/// Render one period and return the deinterleaved f32 channels.
fn render_period(handle: &sf_engine::LoopbackBackend) -> Vec<Vec<f32>> {
    let config = handle.config();
    let channels = config.layout.count();
    let mut bytes = vec![0u8; config.update_size * config.frame_size()];
    handle.render(&mut bytes, config.update_size).unwrap();

    let mut out = vec![vec![0.0f32; config.update_size]; channels];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        out[i % channels][i / channels] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

fn energy(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s * s).sum()
}

/// Scenario 1: a mono sine hard right on a stereo device reproduces at
/// full level on the right channel and silence on the left.
#[test]
fn test_mono_source_panned_right() {
    init_logs();
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Stereo, 48000, 1024)).unwrap();
    let ctx = device.new_context();

    let sine: Vec<f32> = (0..4800)
        .map(|i| (std::f32::consts::TAU * 1000.0 * i as f32 / 48000.0).sin())
        .collect();
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &sine).unwrap();

    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.with_source_props(source, |p| {
        p.position = [1.0, 0.0, 0.0];
        p.gain = 1.0;
        p.ref_distance = 1.0;
        p.rolloff = 1.0;
    })
    .unwrap();
    ctx.play(source).unwrap();

    // First period ramps gains up from silence; judge the second.
    let _warmup = render_period(&handle);
    let out = render_period(&handle);

    let right_peak = peak(&out[1]);
    assert!(
        (0.99..=1.01).contains(&right_peak),
        "right peak {right_peak}"
    );
    assert!(peak(&out[0]) < 0.01, "left leaked {}", peak(&out[0]));
}

/// Scenario 2: pitch 2.0 consumes source samples twice as fast; after one
/// 512-frame period the cursor sits at 1024.
#[test]
fn test_pitch_two_advances_double() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Mono, 44100, 512)).unwrap();
    let ctx = device.new_context();

    let mut impulse = vec![0.0f32; 2048];
    impulse[0] = 1.0;
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 44100, &impulse).unwrap();

    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.with_source_props(source, |p| p.pitch = 2.0).unwrap();
    ctx.play(source).unwrap();

    let out = render_period(&handle);
    assert_eq!(ctx.source_position(source).unwrap(), 1024);
    // The impulse appears once, at the start.
    assert!(out[0][0].abs() > 0.0);
    assert!(energy(&out[0][8..]) < 1e-6);
}

/// Scenario 3: a non-spatialized stereo buffer on 7.1 routes its channels
/// to the front pair only.
#[test]
fn test_spatialize_off_routes_direct() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::X71, 48000, 512)).unwrap();
    let ctx = device.new_context();

    // Distinct constants per side.
    let data: Vec<f32> = (0..2 * 4800)
        .map(|i| if i % 2 == 0 { 0.5 } else { -0.25 })
        .collect();
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Stereo, 48000, &data).unwrap();

    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.with_source_props(source, |p| p.spatialize = SpatializeMode::Off)
        .unwrap();
    ctx.play(source).unwrap();

    let _warmup = render_period(&handle);
    let out = render_period(&handle);

    // X71 ordering: FL FR FC LFE BL BR SL SR.
    assert!((out[0][256] - 0.5).abs() < 1e-3, "FL {}", out[0][256]);
    assert!((out[1][256] + 0.25).abs() < 1e-3, "FR {}", out[1][256]);
    for ch in 2..8 {
        assert!(energy(&out[ch]) < 1e-9, "channel {ch} not silent");
    }
}

/// Scenario 4: a source routed to an effect slot adds wet energy on top of
/// the direct path.
#[test]
fn test_effect_slot_adds_wet_path() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Stereo, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let sine: Vec<f32> = (0..4800)
        .map(|i| 0.25 * (std::f32::consts::TAU * 440.0 * i as f32 / 48000.0).sin())
        .collect();
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &sine).unwrap();

    // Dry-only reference.
    let source = ctx.add_source();
    ctx.queue_buffer(source, Arc::clone(&buffer)).unwrap();
    ctx.play(source).unwrap();
    let _warmup = render_period(&handle);
    let dry = render_period(&handle);
    ctx.stop(source).unwrap();
    let _drain = render_period(&handle);

    // Same source through a pass-through slot (implicit default send).
    let slot = ctx.add_slot(EffectKind::Dedicated);
    ctx.with_slot_props(slot, |p| {
        p.effect = EffectProps::Dedicated(sf_engine::DedicatedProps { gain: 1.0 });
    })
    .unwrap();
    ctx.with_props(|p| p.default_slot = Some(slot));
    ctx.play(source).unwrap();
    let _warmup = render_period(&handle);
    let wet = render_period(&handle);

    let dry_energy = energy(&dry[0]) + energy(&dry[1]);
    let wet_energy = energy(&wet[0]) + energy(&wet[1]);
    assert!(
        wet_energy > dry_energy * 1.5,
        "wet {wet_energy} vs dry {dry_energy}"
    );
}

/// Scenario 5: deferred updates publish atomically: the mixer sees the
/// pre-defer state for every object until process_updates.
#[test]
fn test_defer_process_updates() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Stereo, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let tone: Vec<f32> = (0..48000)
        .map(|i| (std::f32::consts::TAU * 220.0 * i as f32 / 48000.0).sin())
        .collect();
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &tone).unwrap();

    // Source A starts hard left; source B starts at full gain.
    let a = ctx.add_source();
    ctx.queue_buffer(a, Arc::clone(&buffer)).unwrap();
    ctx.with_source_props(a, |p| p.position = [-1.0, 0.0, 0.0]).unwrap();
    ctx.play(a).unwrap();

    let _warmup = render_period(&handle);

    // Defer, then move A right and mute it; both changes must land
    // together.
    ctx.defer_updates();
    ctx.with_source_props(a, |p| p.position = [1.0, 0.0, 0.0]).unwrap();
    ctx.with_source_props(a, |p| p.gain = 0.0).unwrap();

    let deferred = render_period(&handle);
    // Old state: still left, still audible.
    assert!(peak(&deferred[0]) > 0.5, "left {}", peak(&deferred[0]));
    assert!(peak(&deferred[1]) < 0.01, "right {}", peak(&deferred[1]));

    ctx.process_updates();
    let _ramp = render_period(&handle);
    let after = render_period(&handle);
    // New state: muted everywhere (position and gain arrived together).
    assert!(peak(&after[0]) < 0.01);
    assert!(peak(&after[1]) < 0.01);
}

/// Scenario 6: a disconnected device renders exact silence and freezes
/// voice positions, which stay readable.
#[test]
fn test_disconnect_produces_silence() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Stereo, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let tone: Vec<f32> = (0..48000)
        .map(|i| (std::f32::consts::TAU * 330.0 * i as f32 / 48000.0).sin())
        .collect();
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &tone).unwrap();
    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.play(source).unwrap();

    let _audible = render_period(&handle);
    let position = ctx.source_position(source).unwrap();
    assert!(position > 0);

    device.disconnect();
    assert!(!device.is_connected());

    let silent = render_period(&handle);
    assert_eq!(energy(&silent[0]), 0.0);
    assert_eq!(energy(&silent[1]), 0.0);
    // The voice state is frozen but still consultable.
    assert_eq!(ctx.source_position(source).unwrap(), position);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Playing);
}

/// Looping sources wrap the queue seamlessly instead of stopping.
#[test]
fn test_looping_source_keeps_playing() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Mono, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let short: Vec<f32> = vec![0.5; 300];
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &short).unwrap();
    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.with_source_props(source, |p| p.looping = true).unwrap();
    ctx.play(source).unwrap();

    for _ in 0..4 {
        let out = render_period(&handle);
        // Constant signal persists across wraps.
        assert!(peak(&out[0]) > 0.4);
    }
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Playing);
}

/// A non-looping source stops at queue exhaustion and reports Stopped.
#[test]
fn test_source_stops_at_end() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Mono, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let short: Vec<f32> = vec![0.5; 700];
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &short).unwrap();
    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.play(source).unwrap();

    let _first = render_period(&handle);
    let _second = render_period(&handle);
    let third = render_period(&handle);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Stopped);
    assert!(energy(&third[0]) < 1e-9);
}

/// Pause holds the playback cursor; resume continues from it.
#[test]
fn test_pause_freezes_position() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Mono, 48000, 512)).unwrap();
    let ctx = device.new_context();

    let tone: Vec<f32> = vec![0.25; 48000];
    let buffer = SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 48000, &tone).unwrap();
    let source = ctx.add_source();
    ctx.queue_buffer(source, buffer).unwrap();
    ctx.play(source).unwrap();

    let _run = render_period(&handle);
    ctx.pause(source).unwrap();
    let _pause_tick = render_period(&handle);
    let held = ctx.source_position(source).unwrap();
    let silent = render_period(&handle);
    assert_eq!(ctx.source_position(source).unwrap(), held);
    assert!(energy(&silent[0]) < 1e-9);
    assert_eq!(ctx.source_state(source).unwrap(), SourceState::Paused);

    ctx.resume(source).unwrap();
    let _resumed = render_period(&handle);
    assert!(ctx.source_position(source).unwrap() > held);
}

/// The mix seqlock closes even (completed iterations readable).
#[test]
fn test_mix_count_advances() {
    let (mut device, handle) = Device::open_loopback(stream(ChannelLayout::Stereo, 48000, 512)).unwrap();
    let _ctx = device.new_context();
    assert_eq!(device.mix_count(), 0);
    let _a = render_period(&handle);
    let _b = render_period(&handle);
    assert_eq!(device.mix_count(), 2);
    assert_eq!(device.clock_latency().clock_samples, 1024);
}
