//! Parser benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wifilink_core::{extract_body, find_substring, parser};

const STATUS: &[u8] =
    b"STATUS:3\r\n+CIPSTATUS:0,\"TCP\",\"93.184.216.34\",80,12345,0\r\n\r\nOK\r\n";

fn matcher_benchmark(c: &mut Criterion) {
    let mut frame = vec![b'.'; 1400];
    frame.extend_from_slice(b"\r\nSEND OK\r\n");

    c.bench_function("find_substring_tail", |b| {
        b.iter(|| black_box(find_substring(black_box(&frame), b"SEND OK")))
    });
}

fn parser_benchmark(c: &mut Criterion) {
    c.bench_function("quoted_second_field", |b| {
        b.iter(|| black_box(parser::quoted(black_box(STATUS), 2).unwrap()))
    });

    c.bench_function("number_after_label", |b| {
        b.iter(|| black_box(parser::number_after(black_box(STATUS), "CIPSTATUS").unwrap()))
    });
}

fn body_benchmark(c: &mut Criterion) {
    let mut raw = b"+IPD,512:HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n".to_vec();
    raw.extend_from_slice(&[b'x'; 400]);

    c.bench_function("extract_body", |b| {
        b.iter(|| black_box(extract_body(black_box(&raw)).unwrap()))
    });
}

criterion_group!(benches, matcher_benchmark, parser_benchmark, body_benchmark);
criterion_main!(benches);
