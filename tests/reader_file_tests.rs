use std::sync::Arc;
use std::time::Duration;

use airlift_ingest::{
    AudioReader, AudioReaderState, ByteRingBuffer, ConsumerBuffer, MediaFile, MediaFileType,
    ReaderConfig, ReaderError,
};

fn fast_config(transfer_buffer_size: usize) -> ReaderConfig {
    ReaderConfig {
        transfer_buffer_size,
        read_write_timeout_ms: 1,
        pacing_delay_ms: 1,
        ..Default::default()
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Steps until a terminal state, draining the ring after every step.
fn run_to_end(reader: &mut AudioReader, ring: &ByteRingBuffer) -> (AudioReaderState, Vec<u8>, usize) {
    let mut collected = Vec::new();
    let mut buf = vec![0u8; ring.capacity()];
    let mut steps = 0;

    loop {
        let state = reader.step();
        steps += 1;
        loop {
            let n = ring.read(&mut buf, Duration::ZERO);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        if state.is_terminal() {
            return (state, collected, steps);
        }
        assert!(steps < 100_000, "reader never finished");
    }
}

#[test]
fn test_file_transfers_all_bytes_in_order() {
    for transfer_size in [1, 3, 64, 1000] {
        for len in [0, 1, 255, 1000] {
            let ring = Arc::new(ByteRingBuffer::new(64));
            let mut reader = AudioReader::with_config(ring.clone(), fast_config(transfer_size));
            let data = payload(len);

            let file_type = reader
                .start_file(&MediaFile::new(data.clone(), MediaFileType::Mp3))
                .unwrap();
            assert_eq!(file_type, MediaFileType::Mp3);

            let (state, collected, _) = run_to_end(&mut reader, &ring);
            assert_eq!(state, AudioReaderState::Finished);
            assert_eq!(collected, data, "transfer={} len={}", transfer_size, len);
            assert_eq!(reader.stats().bytes_forwarded, len as u64);
        }
    }
}

#[test]
fn test_steps_after_finish_do_not_touch_consumer() {
    let ring = Arc::new(ByteRingBuffer::new(32));
    let mut reader = AudioReader::with_config(ring.clone(), fast_config(8));
    reader
        .start_file(&MediaFile::new(payload(20), MediaFileType::Wav))
        .unwrap();

    let (state, _, _) = run_to_end(&mut reader, &ring);
    assert_eq!(state, AudioReaderState::Finished);

    let before = ring.stats();
    for _ in 0..5 {
        assert_eq!(reader.step(), AudioReaderState::Finished);
    }
    assert_eq!(ring.stats(), before);
}

#[test]
fn test_full_consumer_keeps_reading_state() {
    let ring = Arc::new(ByteRingBuffer::new(4));
    let mut reader = AudioReader::with_config(ring.clone(), fast_config(4));
    reader
        .start_file(&MediaFile::new(payload(10), MediaFileType::Flac))
        .unwrap();

    assert_eq!(reader.step(), AudioReaderState::Reading);
    assert_eq!(ring.free(), 0);

    // Nothing fits, the reader still reports progress and polls again.
    for _ in 0..3 {
        assert_eq!(reader.step(), AudioReaderState::Reading);
    }
    assert_eq!(reader.remaining(), Some(6));
}

#[test]
fn test_declared_type_is_reported_without_inspection() {
    let ring = Arc::new(ByteRingBuffer::new(16));
    let mut reader = AudioReader::with_config(ring, fast_config(8));

    let file = MediaFile::new(b"definitely not flac".to_vec(), MediaFileType::Flac);
    assert_eq!(reader.start_file(&file).unwrap(), MediaFileType::Flac);
    assert_eq!(reader.file_type(), MediaFileType::Flac);
    assert!(!reader.has_network_session());
}

#[test]
fn test_restart_after_finish_is_independent() {
    let ring = Arc::new(ByteRingBuffer::new(16));
    let mut reader = AudioReader::with_config(ring.clone(), fast_config(8));

    reader
        .start_file(&MediaFile::new(payload(40), MediaFileType::Wav))
        .unwrap();
    let (state, first, _) = run_to_end(&mut reader, &ring);
    assert_eq!(state, AudioReaderState::Finished);
    assert_eq!(first.len(), 40);

    let second_data: Vec<u8> = vec![0xAB; 25];
    reader
        .start_file(&MediaFile::new(second_data.clone(), MediaFileType::Mp3))
        .unwrap();
    assert_eq!(reader.stats().bytes_forwarded, 0);

    let (state, second, _) = run_to_end(&mut reader, &ring);
    assert_eq!(state, AudioReaderState::Finished);
    assert_eq!(second, second_data);
    assert_eq!(reader.file_type(), MediaFileType::Mp3);
}

#[test]
fn test_allocation_failure_aborts_start() {
    let ring = Arc::new(ByteRingBuffer::new(16));
    let mut reader = AudioReader::with_config(ring, fast_config(usize::MAX));

    let err = reader
        .start_file(&MediaFile::new(payload(4), MediaFileType::Wav))
        .unwrap_err();
    assert!(matches!(err, ReaderError::Allocation { .. }));
    assert_eq!(reader.file_type(), MediaFileType::None);
    assert_eq!(reader.step(), AudioReaderState::Failed);
}

#[test]
fn test_staging_buffer_allocated_once_on_first_start() {
    let ring = Arc::new(ByteRingBuffer::new(16));
    let mut reader = AudioReader::with_config(ring, fast_config(8));
    assert!(!reader.is_transfer_allocated());

    reader
        .start_file(&MediaFile::new(payload(4), MediaFileType::Wav))
        .unwrap();
    assert!(reader.is_transfer_allocated());
    assert_eq!(reader.transfer_capacity(), 8);
}
