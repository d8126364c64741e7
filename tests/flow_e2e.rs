use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use airlift_ingest::{
    AudioReader, AudioReaderState, ByteRingBuffer, MediaFile, MediaFileType, ReaderConfig,
};

const WAV_LEN: usize = 10_000;

fn wav_fixture() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).expect("wav writer");
        for i in 0..(WAV_LEN - 44) / 2 {
            let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            writer.write_sample(sample).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    assert!(bytes.starts_with(b"RIFF"));
    bytes.resize(WAV_LEN, 0);
    bytes
}

fn reader_config() -> ReaderConfig {
    ReaderConfig {
        transfer_buffer_size: 64,
        read_write_timeout_ms: 20,
        ..Default::default()
    }
}

#[test]
fn e2e_wav_drains_in_expected_steps() {
    let wav = wav_fixture();
    let ring = Arc::new(ByteRingBuffer::new(256));
    let mut reader = AudioReader::with_config(ring.clone(), reader_config());

    let file_type = reader
        .start_file(&MediaFile::new(wav.clone(), MediaFileType::Wav))
        .unwrap();
    assert_eq!(file_type, MediaFileType::Wav);

    // The consumer empties the ring between steps, so every step writes a full ring.
    let mut collected = Vec::with_capacity(WAV_LEN);
    let mut buf = [0u8; 256];
    let mut reading_steps = 0;
    loop {
        match reader.step() {
            AudioReaderState::Reading => reading_steps += 1,
            AudioReaderState::Finished => break,
            AudioReaderState::Failed => panic!("file stream failed"),
        }
        let n = ring.read(&mut buf, Duration::ZERO);
        collected.extend_from_slice(&buf[..n]);
    }

    assert_eq!(reading_steps, WAV_LEN.div_ceil(256));
    assert_eq!(reader.stats().bytes_forwarded, WAV_LEN as u64);
    assert_eq!(collected, wav);
}

#[test]
fn e2e_wav_with_concurrent_consumer() {
    let wav = wav_fixture();
    let ring = Arc::new(ByteRingBuffer::new(256));
    let done = Arc::new(AtomicBool::new(false));

    let consumer = {
        let ring = ring.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut collected = Vec::with_capacity(WAV_LEN);
            let mut buf = [0u8; 100];
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                let n = ring.read(&mut buf, Duration::from_millis(5));
                collected.extend_from_slice(&buf[..n]);
                if n == 0 && done.load(Ordering::SeqCst) && ring.is_empty() {
                    break;
                }
            }
            collected
        })
    };

    let mut reader = AudioReader::with_config(ring.clone(), reader_config());
    reader
        .start_file(&MediaFile::new(wav.clone(), MediaFileType::Wav))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut state = AudioReaderState::Reading;
    while state == AudioReaderState::Reading && Instant::now() < deadline {
        state = reader.step();
    }
    done.store(true, Ordering::SeqCst);

    let collected = consumer.join().expect("consumer thread");
    assert_eq!(state, AudioReaderState::Finished);
    assert_eq!(reader.stats().bytes_forwarded, WAV_LEN as u64);
    assert_eq!(collected.len(), WAV_LEN);
    assert_eq!(collected, wav);
}
