use bulwark::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use bulwark::concurrency::ConcurrencyLimiter;
use bulwark::config::{BulwarkConfig, PipelineConfig};
use bulwark::error::DependencyError;
use bulwark::pipeline::Pipeline;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn benchmark_breaker_admission(c: &mut Criterion) {
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());

    c.bench_function("breaker_closed_success", |b| {
        b.iter(|| {
            let permit = breaker.try_acquire();
            if let Some(permit) = black_box(permit) {
                permit.on_success();
            }
        });
    });

    let open = CircuitBreaker::new("bench-open", CircuitBreakerConfig::default());
    open.trip();

    c.bench_function("breaker_open_rejection", |b| {
        b.iter(|| black_box(open.try_acquire().is_none()));
    });
}

fn benchmark_pipeline_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = Pipeline::new("bench", PipelineConfig::default()).unwrap();
    let cancel = CancellationToken::new();

    c.bench_function("pipeline_execute_success", |b| {
        b.to_async(&rt).iter(|| async {
            let result = pipeline
                .execute(&cancel, |_| async { Ok::<_, DependencyError>(black_box(1u64)) })
                .await;
            black_box(result)
        });
    });

    let open = Pipeline::new("bench-open", PipelineConfig::default()).unwrap();
    open.circuit_breaker().trip();

    c.bench_function("pipeline_execute_circuit_open", |b| {
        b.to_async(&rt).iter(|| async {
            let result = open
                .execute(&cancel, |_| async { Ok::<_, DependencyError>(()) })
                .await;
            black_box(result)
        });
    });
}

fn benchmark_limiter_contention(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("limiter_contention");

    for tasks in [1usize, 8, 64].iter() {
        let limiter = ConcurrencyLimiter::new("bench", 4, 1_024);

        group.bench_with_input(BenchmarkId::from_parameter(tasks), tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| {
                let limiter = limiter.clone();
                async move {
                    let cancel = CancellationToken::new();
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let limiter = limiter.clone();
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                let lease = limiter.acquire(&cancel).await;
                                tokio::task::yield_now().await;
                                drop(black_box(lease));
                            })
                        })
                        .collect();
                    for handle in handles {
                        let _ = handle.await;
                    }
                }
            });
        });
    }

    group.finish();
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
defaults:
  retry:
    max_retry_attempts: 3
    backoff_type: exponential

dependencies:
  case-db:
    circuit_breaker:
      failure_ratio_threshold: 0.5
      minimum_throughput: 20
    timeout:
      per_attempt_timeout_ms: 5000
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(BulwarkConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_breaker_admission,
    benchmark_pipeline_execute,
    benchmark_limiter_contention,
    benchmark_config_parsing
);
criterion_main!(benches);
