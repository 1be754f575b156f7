use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pacekeeper::scheduler::{PriorityQueue, SlidingWindowCounter};
use pacekeeper::{InstantSleeper, ManualClock, Scheduler, SchedulerConfig};
use std::time::Duration;

fn queue_push_pop(c: &mut Criterion) {
    c.bench_function("queue_push_pop_1k_mixed_priority", |b| {
        b.iter(|| {
            let mut queue = PriorityQueue::new();
            for i in 0..1_000u64 {
                queue.push(i, "chat", (i % 7) as u8, i);
            }
            while let Some(req) = queue.pop() {
                black_box(req.action);
            }
        });
    });
}

fn window_check_record(c: &mut Criterion) {
    c.bench_function("window_check_record_25_per_60s", |b| {
        let mut window = SlidingWindowCounter::new(Duration::from_secs(60), 25);
        let mut now = 0u64;
        b.iter(|| {
            // 2.5s apart keeps the window saturated without ever blocking.
            now += 2_500;
            if black_box(window.check(now)).is_open() {
                window.record(now);
            }
        });
    });
}

fn enqueue_to_completion(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config =
        SchedulerConfig::new(1_000_000, Duration::from_secs(1), Duration::ZERO, Duration::ZERO)
            .unwrap();
    let scheduler = rt.block_on(async {
        Scheduler::builder(config)
            .clock(ManualClock::new())
            .sleeper(InstantSleeper)
            .build()
    });

    c.bench_function("enqueue_to_completion_virtual_time", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(
                scheduler
                    .enqueue(|| async { Ok::<_, std::io::Error>(black_box(1)) }, "chat", 1)
                    .await,
            );
        });
    });
}

criterion_group!(benches, queue_push_pop, window_check_record, enqueue_to_completion);
criterion_main!(benches);
