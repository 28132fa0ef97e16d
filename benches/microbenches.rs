//! Criterion microbenches for tatorsync's hot text paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - YOLO label line parsing (parse_label_line)
//! - Frame file name patterns (format_frame_pattern)
//! - Localization CSV parsing and writing (Table)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::path::Path;

use tatorsync::table::Table;
use tatorsync::transfer::format_frame_pattern;
use tatorsync::yolo::import::parse_label_line;

const LABEL_LINES: &str = "0 0.512000 0.433000 0.120000 0.087000
3 0.105000 0.902000 0.050000 0.044000 0.91
1 0.750000 0.250000 0.300000 0.310000

2 0.001000 0.999000 0.002000 0.001000 0.12
";

fn localization_csv(rows: usize) -> String {
    let mut csv = String::from("id,media,frame,x,y,width,height,Class,Verified\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "{i},cam7_2023.mp4,{},0.{:03},0.2,0.05,0.07,diatom,True\n",
            i / 4,
            i % 1000
        ));
    }
    csv
}

/// Benchmark parsing a block of label lines.
fn bench_label_lines(c: &mut Criterion) {
    let lines: Vec<&str> = LABEL_LINES.lines().collect();
    let path = Path::new("cam7_000012.txt");

    let mut group = c.benchmark_group("yolo_labels");
    group.throughput(Throughput::Elements(lines.len() as u64));

    group.bench_function("parse_label_line", |b| {
        b.iter(|| {
            for (idx, line) in lines.iter().enumerate() {
                let parsed = parse_label_line(black_box(line), path, idx + 1).unwrap();
                black_box(parsed);
            }
        })
    });

    group.finish();
}

/// Benchmark frame file name rendering.
fn bench_frame_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_pattern");

    group.bench_function("padded", |b| {
        b.iter(|| {
            let name = format_frame_pattern(black_box("img_{:06d}.tiff"), black_box(4213)).unwrap();
            black_box(name)
        })
    });

    group.finish();
}

/// Benchmark CSV table parsing and writing.
fn bench_table(c: &mut Criterion) {
    let csv = localization_csv(2_000);
    let table = Table::from_csv_str(&csv).expect("Failed to parse CSV fixture");

    let mut group = c.benchmark_group("localization_csv");
    group.throughput(Throughput::Bytes(csv.len() as u64));

    group.bench_function("from_csv_str", |b| {
        b.iter(|| {
            let table = Table::from_csv_str(black_box(&csv)).unwrap();
            black_box(table)
        })
    });

    group.bench_function("to_csv_string", |b| {
        b.iter(|| {
            let out = black_box(&table).to_csv_string().unwrap();
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_label_lines, bench_frame_pattern, bench_table);
criterion_main!(benches);
