use apkg::archive::{pack_to_writer, PackOptions};
use apkg::codec::DeflateCodec;
use apkg::crypto::{DerivedKey, EntryCipher};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use std::io::Cursor;

fn audio_like(len: usize) -> Vec<u8> {
    // Slow ramp: compressible but not trivially so.
    (0..len).map(|i| ((i / 7) as u8).wrapping_mul(3)).collect()
}

fn bench_deflate(c: &mut Criterion) {
    let data = audio_like(1024 * 1024);
    let best = DeflateCodec::default();
    let fast = DeflateCodec::new(1);

    c.bench_function("deflate_level9_1mb", |b| b.iter(|| best.compress(black_box(&data)).unwrap()));
    c.bench_function("deflate_level1_1mb", |b| b.iter(|| fast.compress(black_box(&data)).unwrap()));
}

fn bench_seal(c: &mut Criterion) {
    let data = audio_like(1024 * 1024);
    let cipher = EntryCipher::new(&DerivedKey::from_bytes([7u8; 32])).unwrap();
    let nonce = [1u8; 16];

    c.bench_function("aes256gcm_seal_1mb", |b| {
        b.iter(|| cipher.seal(&nonce, black_box(&data), b"kick.wav").unwrap())
    });
}

fn bench_pack(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<_> = (0..4)
        .map(|i| {
            let path = dir.path().join(format!("take_{i}.wav"));
            fs::write(&path, audio_like(256 * 1024)).unwrap();
            path
        })
        .collect();
    let opts = PackOptions::default();

    c.bench_function("pack_4x256k", |b| {
        b.iter(|| {
            let mut buf = Cursor::new(Vec::new());
            pack_to_writer(&inputs, &mut buf, black_box("bench"), &opts).unwrap();
        })
    });
}

criterion_group!(benches, bench_deflate, bench_seal, bench_pack);
criterion_main!(benches);
