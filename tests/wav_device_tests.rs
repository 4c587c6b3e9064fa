mod common;

use anyhow::Result;
use common::read_wav;
use chrono::Utc;
use hearhear::audio::{
    AudioCodec, AudioFrame, CaptureDevice, CaptureSettings, RecordOutcome, WavCaptureDevice,
};
use hearhear::store::ChunkStore;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const RATE: u32 = 1_000;

fn settings() -> CaptureSettings {
    CaptureSettings {
        sample_rate: RATE,
        channels: 1,
        codec: AudioCodec::Pcm16,
        ..CaptureSettings::default()
    }
}

fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: RATE,
        channels: 1,
        timestamp_ms: 0,
    }
}

/// Device plus the sender feeding it frames.
async fn configured_device() -> Result<(WavCaptureDevice, mpsc::Sender<AudioFrame>)> {
    let (tx, rx) = mpsc::channel(64);
    let mut device = WavCaptureDevice::new(rx);
    device.configure(&settings()).await?;
    Ok((device, tx))
}

/// Let the worker drain queued frames.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_configure_rejects_unsupported_settings() {
    let (_tx, rx) = mpsc::channel(1);
    let mut device = WavCaptureDevice::new(rx);

    let aac = CaptureSettings {
        codec: AudioCodec::Aac,
        ..settings()
    };
    assert!(device.configure(&aac).await.is_err());

    let silent = CaptureSettings {
        channels: 0,
        ..settings()
    };
    assert!(device.configure(&silent).await.is_err());
}

#[tokio::test]
async fn test_record_requires_configuration() -> Result<()> {
    let temp = TempDir::new()?;
    let (_tx, rx) = mpsc::channel(1);
    let mut device = WavCaptureDevice::new(rx);

    let result = device
        .record_for(Duration::from_secs(1), &temp.path().join("a.wav"))
        .await;

    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_chunk_ends_after_exact_sample_count() -> Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("first.wav");
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(1), &target).await?;
    for block in 0..4 {
        tx.send(frame((block * 300..(block + 1) * 300).map(|s| s as i16).collect()))
            .await?;
    }

    assert_eq!(done.await?, RecordOutcome::Finished);
    let samples = read_wav(&target)?;
    assert_eq!(samples.len(), 1_000);
    assert_eq!(samples[999], 999);
    Ok(())
}

#[tokio::test]
async fn test_overflow_carries_into_next_chunk() -> Result<()> {
    let temp = TempDir::new()?;
    let first = temp.path().join("first.wav");
    let second = temp.path().join("second.wav");
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(1), &first).await?;
    tx.send(frame((0..1_200).map(|s| s as i16).collect())).await?;
    assert_eq!(done.await?, RecordOutcome::Finished);

    let done = device.record_for(Duration::from_secs(1), &second).await?;
    tx.send(frame((1_200..2_000).map(|s| s as i16).collect()))
        .await?;
    assert_eq!(done.await?, RecordOutcome::Finished);

    let samples = read_wav(&second)?;
    assert_eq!(samples.len(), 1_000);
    assert_eq!(samples[0], 1_000);
    assert_eq!(samples[999], 1_999);
    Ok(())
}

#[tokio::test]
async fn test_frames_between_chunks_are_kept_as_preroll() -> Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("chunk.wav");
    let (mut device, tx) = configured_device().await?;

    // Two seconds while idle; only the last second survives
    tx.send(frame(vec![1; 1_000])).await?;
    tx.send(frame(vec![2; 1_000])).await?;
    settle().await;

    let done = device.record_for(Duration::from_secs(2), &target).await?;
    tx.send(frame(vec![3; 1_000])).await?;
    assert_eq!(done.await?, RecordOutcome::Finished);

    let samples = read_wav(&target)?;
    assert_eq!(samples.len(), 2_000);
    assert!(samples[..1_000].iter().all(|&s| s == 2));
    assert!(samples[1_000..].iter().all(|&s| s == 3));
    Ok(())
}

#[tokio::test]
async fn test_stop_finalizes_partial_chunk() -> Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("partial.wav");
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(30), &target).await?;
    tx.send(frame(vec![7; 250])).await?;
    settle().await;
    device.stop().await?;

    assert_eq!(done.await?, RecordOutcome::Finished);
    assert_eq!(read_wav(&target)?, vec![7; 250]);
    Ok(())
}

#[tokio::test]
async fn test_second_record_while_busy_is_rejected() -> Result<()> {
    let temp = TempDir::new()?;
    let (mut device, _tx) = configured_device().await?;

    let _done = device
        .record_for(Duration::from_secs(1), &temp.path().join("a.wav"))
        .await?;
    let second = device
        .record_for(Duration::from_secs(1), &temp.path().join("b.wav"))
        .await;

    assert!(second.is_err());
    Ok(())
}

#[tokio::test]
async fn test_mismatched_frame_format_fails_chunk() -> Result<()> {
    let temp = TempDir::new()?;
    let (mut device, tx) = configured_device().await?;

    let done = device
        .record_for(Duration::from_secs(1), &temp.path().join("a.wav"))
        .await?;
    tx.send(AudioFrame {
        samples: vec![0; 100],
        sample_rate: 48_000,
        channels: 2,
        timestamp_ms: 0,
    })
    .await?;

    assert!(matches!(done.await?, RecordOutcome::Failed(_)));
    Ok(())
}

#[tokio::test]
async fn test_failed_chunk_leaves_nothing_for_the_store() -> Result<()> {
    let temp = TempDir::new()?;
    let store = ChunkStore::open(temp.path(), "wav", Duration::from_secs(1))?;
    let target = store.location_for(Utc::now(), 1);
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(1), &target).await?;
    tx.send(frame(vec![4; 300])).await?;
    tx.send(AudioFrame {
        samples: vec![0; 100],
        sample_rate: 48_000,
        channels: 2,
        timestamp_ms: 0,
    })
    .await?;

    assert!(matches!(done.await?, RecordOutcome::Failed(_)));
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);

    let reopened = ChunkStore::open(temp.path(), "wav", Duration::from_secs(1))?;
    assert!(reopened.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_chunk_in_progress_is_invisible_to_the_store() -> Result<()> {
    let temp = TempDir::new()?;
    let store = ChunkStore::open(temp.path(), "wav", Duration::from_secs(1))?;
    let target = store.location_for(Utc::now(), 1);
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(1), &target).await?;
    tx.send(frame(vec![4; 300])).await?;
    settle().await;

    assert!(!target.exists());
    assert!(ChunkStore::open(temp.path(), "wav", Duration::from_secs(1))?.is_empty());

    tx.send(frame(vec![4; 700])).await?;
    assert_eq!(done.await?, RecordOutcome::Finished);
    assert!(target.exists());
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 1);
    assert_eq!(ChunkStore::open(temp.path(), "wav", Duration::from_secs(1))?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_closed_source_finishes_chunk_and_refuses_more() -> Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("a.wav");
    let (mut device, tx) = configured_device().await?;

    let done = device.record_for(Duration::from_secs(1), &target).await?;
    tx.send(frame(vec![5; 400])).await?;
    drop(tx);

    assert_eq!(done.await?, RecordOutcome::Finished);
    assert_eq!(read_wav(&target)?.len(), 400);

    let next = device
        .record_for(Duration::from_secs(1), &temp.path().join("b.wav"))
        .await;
    assert!(next.is_err());
    Ok(())
}
