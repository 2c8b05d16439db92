use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::fs;
use std::io::Write;
use std::path::Path;
use xzrelay::config::DecoderConfig;
use xzrelay::gate;
use xzrelay::integrity;
use xzrelay::session::DecodeSession;
use xzrelay::sink::NullSink;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    // Text-like: random bytes from a small alphabet compress roughly like HTML.
    let alphabet = b"<div class=\"item\">abcdefghijklmnop</div>\n ";
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push(alphabet[(s >> 33) as usize % alphabet.len()]);
    }
    out
}

fn compress(data: &[u8], level: u32) -> Vec<u8> {
    let mut enc = xz2::write::XzEncoder::new(Vec::new(), level);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn decode_in_chunks(compressed: &[u8], chunk: usize) -> u64 {
    let mut s = DecodeSession::new(&DecoderConfig::default(), NullSink).unwrap();
    let mut offset = 0u64;
    for c in compressed.chunks(chunk) {
        s.deliver(offset, c).unwrap();
        offset += c.len() as u64;
    }
    s.stats().bytes_out
}

fn write_relay_snapshot() {
    let data = gen_data(4 * 1024 * 1024, 5);
    let compressed = compress(&data, 6);
    let mut csv = String::from("chunk_bytes,relay_calls,output_bytes\n");
    for chunk in [512usize, 4096, 16 * 1024, 64 * 1024, 1024 * 1024] {
        let mut s = DecodeSession::new(&DecoderConfig::default(), NullSink).unwrap();
        let mut offset = 0u64;
        for c in compressed.chunks(chunk) {
            s.deliver(offset, c).unwrap();
            offset += c.len() as u64;
        }
        let stats = s.stats();
        csv.push_str(&format!("{chunk},{},{}\n", stats.relays, stats.bytes_out));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("relay_snapshot.csv"), csv);
}

fn bench_decode_throughput(c: &mut Criterion) {
    let mut g = c.benchmark_group("decode_throughput_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let data = gen_data(size, 1);
        let compressed = compress(&data, 6);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(decode_in_chunks(black_box(&compressed), 16 * 1024)));
        });
    }
    g.finish();
}

fn bench_chunk_size(c: &mut Criterion) {
    write_relay_snapshot();
    let mut g = c.benchmark_group("decode_vs_chunk_size");
    let data = gen_data(2 * 1024 * 1024, 2);
    let compressed = compress(&data, 6);
    g.throughput(Throughput::Bytes(data.len() as u64));
    for chunk in [64usize, 512, 4096, 16 * 1024, 64 * 1024, 1024 * 1024] {
        g.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, chunk| {
            b.iter(|| black_box(decode_in_chunks(black_box(&compressed), *chunk)));
        });
    }
    g.finish();
}

fn bench_vs_reader(c: &mut Criterion) {
    let mut g = c.benchmark_group("session_vs_xz2_reader");
    let data = gen_data(1024 * 1024, 8);
    let compressed = compress(&data, 6);
    g.throughput(Throughput::Bytes(data.len() as u64));

    g.bench_function("session_16k_chunks", |b| {
        b.iter(|| black_box(decode_in_chunks(black_box(&compressed), 16 * 1024)));
    });

    g.bench_function("xz2_read_decoder", |b| {
        b.iter(|| {
            let mut r = xz2::read::XzDecoder::new(black_box(&compressed[..]));
            black_box(std::io::copy(&mut r, &mut std::io::sink()).unwrap());
        });
    });
    g.finish();
}

fn bench_crc64(c: &mut Criterion) {
    let mut g = c.benchmark_group("crc64_relay_stats");
    for size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let data = gen_data(size, 3);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(integrity::crc64(black_box(&data))));
        });
    }
    g.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut g = c.benchmark_group("accept_encoding_reconcile");
    let list = "gzip;q=1.0, deflate;q=0.8, br;q=0.9, zstd, identity;q=0.1";
    g.bench_function("toggle", |b| {
        b.iter(|| {
            let on = gate::reconcile(false, true, black_box(list));
            black_box(gate::reconcile(true, false, &on))
        });
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_decode_throughput,
    bench_chunk_size,
    bench_vs_reader,
    bench_crc64,
    bench_reconcile
);
criterion_main!(benches);
