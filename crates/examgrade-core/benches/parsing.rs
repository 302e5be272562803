use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examgrade_core::model::{AnswerKey, AnswerSequence};
use examgrade_core::parser::{parse_fixture_str, validate_fixture, FixtureOptions};

fn bench_answer_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("answer_parsing");

    let key = "ABCDE".repeat(20);
    let sheet = "ABXDEBBXCA".repeat(10);

    group.bench_function("key_100", |b| {
        b.iter(|| AnswerKey::parse(black_box(&key)))
    });

    group.bench_function("sheet_100", |b| {
        b.iter(|| AnswerSequence::parse(black_box(&sheet)))
    });

    group.finish();
}

fn bench_fixture_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixture_parsing");
    let options = FixtureOptions::default();

    // Fixtures of various sizes
    let small_toml = generate_fixture_toml(10);
    let medium_toml = generate_fixture_toml(100);
    let large_toml = generate_fixture_toml(1000);

    group.bench_function("10_attempts", |b| {
        b.iter(|| {
            parse_fixture_str(
                black_box(&small_toml),
                black_box("bench.toml".as_ref()),
                &options,
            )
        })
    });

    group.bench_function("100_attempts", |b| {
        b.iter(|| {
            parse_fixture_str(
                black_box(&medium_toml),
                black_box("bench.toml".as_ref()),
                &options,
            )
        })
    });

    group.bench_function("1000_attempts", |b| {
        b.iter(|| {
            parse_fixture_str(
                black_box(&large_toml),
                black_box("bench.toml".as_ref()),
                &options,
            )
        })
    });

    if let Ok(fixture) = parse_fixture_str(&large_toml, "bench.toml".as_ref(), &options) {
        group.bench_function("validate_1000", |b| {
            b.iter(|| validate_fixture(black_box(&fixture)))
        });
    }

    group.finish();
}

fn generate_fixture_toml(n: usize) -> String {
    let mut s = String::new();
    for area in ["A", "B", "C", "D", "E"] {
        s.push_str(&format!(
            r#"
[[exams]]
id = "exam_{area}"
title = "Area {area}"
area = "{area}"
"#
        ));
    }
    let choices = ['A', 'B', 'C', 'D', 'E', 'X'];
    for i in 0..n {
        let answers: String = (0..100).map(|q| choices[(i * 7 + q * 3) % 6]).collect();
        let area = ["A", "B", "C", "D", "E"][i % 5];
        s.push_str(&format!(
            r#"
[[attempts]]
id = "att_{i:05}"
exam_id = "exam_{area}"
student_id = "student_{i}"
answers = "{answers}"
"#
        ));
    }
    s
}

criterion_group!(benches, bench_answer_parsing, bench_fixture_parsing);
criterion_main!(benches);
