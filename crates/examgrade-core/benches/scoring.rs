use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examgrade_core::engine::{BatchEvaluator, CancelSignal, EvaluatorConfig, NoopReporter};
use examgrade_core::model::{AnswerKey, AnswerSequence, Attempt, ExamDefinition, ScoringRules};
use examgrade_core::scorer::evaluate;
use examgrade_core::statistics::{compute_exam_stats, rank_results};
use examgrade_core::traits::ExamCatalog;

struct BenchCatalog(HashMap<String, ExamDefinition>);

#[async_trait]
impl ExamCatalog for BenchCatalog {
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<ExamDefinition>> {
        Ok(self.0.get(exam_id).cloned())
    }
}

fn sheet(i: usize) -> String {
    let choices = ['A', 'B', 'C', 'D', 'E', 'X'];
    (0..100).map(|q| choices[(i * 7 + q * 3) % 6]).collect()
}

fn bench_scorer(c: &mut Criterion) {
    let mut group = c.benchmark_group("scorer");
    let rules = ScoringRules::default();
    let key = AnswerKey::uniform('A', 100).unwrap();

    let perfect = AnswerSequence::parse(&"A".repeat(100)).unwrap();
    let mixed = AnswerSequence::parse(&sheet(3)).unwrap();
    let short = AnswerSequence::parse("ABCDE").unwrap();

    group.bench_function("perfect", |b| {
        b.iter(|| evaluate(black_box(&perfect), black_box(&key), &rules))
    });

    group.bench_function("mixed", |b| {
        b.iter(|| evaluate(black_box(&mixed), black_box(&key), &rules))
    });

    group.bench_function("short_padded", |b| {
        b.iter(|| evaluate(black_box(&short), black_box(&key), &rules))
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let exams = ['A', 'B', 'C', 'D', 'E']
        .into_iter()
        .map(|area| {
            let id = format!("exam_{area}");
            let exam = ExamDefinition::new(id.clone(), AnswerKey::uniform(area, 100).unwrap());
            (id, exam)
        })
        .collect();
    let catalog: Arc<dyn ExamCatalog> = Arc::new(BenchCatalog(exams));

    let attempts: Vec<Attempt> = (0..1000)
        .map(|i| {
            let area = ['A', 'B', 'C', 'D', 'E'][i % 5];
            Attempt::new(
                format!("att_{i:05}"),
                format!("exam_{area}"),
                format!("student_{i}"),
                sheet(i),
            )
        })
        .collect();

    for workers in [1, 4, 8] {
        let evaluator = BatchEvaluator::new(
            catalog.clone(),
            EvaluatorConfig {
                worker_count: workers,
                ..Default::default()
            },
        );
        group.bench_function(format!("1000_attempts_{workers}_workers"), |b| {
            b.iter(|| {
                let mut batch = attempts.clone();
                rt.block_on(evaluator.evaluate_batch(
                    black_box(&mut batch),
                    &NoopReporter,
                    CancelSignal::never(),
                ))
            })
        });
    }

    let mut batch = attempts.clone();
    let evaluator = BatchEvaluator::new(catalog, EvaluatorConfig::default());
    if let Ok(outcome) =
        rt.block_on(evaluator.evaluate_batch(&mut batch, &NoopReporter, CancelSignal::never()))
    {
        group.bench_function("exam_stats_1000", |b| {
            b.iter(|| compute_exam_stats(black_box(&outcome.results), 60.0))
        });
        group.bench_function("rank_top_10", |b| {
            b.iter(|| rank_results(black_box(&outcome.results), Some(10)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scorer, bench_batch);
criterion_main!(benches);
