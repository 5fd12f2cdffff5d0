use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use weak_cache::{Collector, WeakCache};

#[derive(Debug)]
struct BenchValue {
	data: Vec<u8>,
}

fn bench_value() -> Arc<BenchValue> {
	Arc::new(BenchValue {
		data: vec![0u8; 64],
	})
}

fn populated(collector: &Collector, count: u64) -> (WeakCache<u64, BenchValue>, Vec<Arc<BenchValue>>) {
	let cache = WeakCache::builder().collector(collector).build();
	let owners = (0..count)
		.map(|i| {
			let owner = bench_value();
			cache.set(i, &owner).unwrap();
			owner
		})
		.collect();
	(cache, owners)
}

fn bench_set(c: &mut Criterion) {
	let mut group = c.benchmark_group("set");

	for size in [100u64, 1000, 10000] {
		let owners: Vec<_> = (0..size).map(|_| bench_value()).collect();
		group.throughput(Throughput::Elements(size));
		group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
			b.iter(|| {
				let cache = WeakCache::builder().collector(&Collector::new()).build();
				for i in 0..size {
					cache.set(black_box(i), &owners[i as usize]).unwrap();
				}
			});
		});
	}

	group.finish();
}

fn bench_get_hit(c: &mut Criterion) {
	let collector = Collector::new();
	let (cache, _owners) = populated(&collector, 1000);

	c.bench_function("get_hit", |b| {
		b.iter(|| {
			for i in 0..1000 {
				black_box(cache.get(&black_box(i)).map(|value| value.data.len()));
			}
		});
	});
}

fn bench_get_miss(c: &mut Criterion) {
	let collector = Collector::new();
	let (cache, _owners) = populated(&collector, 1000);

	c.bench_function("get_miss", |b| {
		b.iter(|| {
			for i in 1000..2000 {
				let _ = cache.get(&black_box(i));
			}
		});
	});
}

fn bench_mixed_workload(c: &mut Criterion) {
	let collector = Collector::new();
	let (cache, owners) = populated(&collector, 500);

	c.bench_function("mixed_80_20", |b| {
		b.iter(|| {
			for i in 0..100u64 {
				if i % 5 == 0 {
					// 20% writes
					cache.set(black_box(i), &owners[i as usize]).unwrap();
				} else {
					// 80% reads
					let _ = cache.get(&black_box(i % 500));
				}
			}
		});
	});
}

fn bench_concurrent_reads(c: &mut Criterion) {
	use std::thread;

	let collector = Collector::new();
	let (cache, _owners) = populated(&collector, 1000);
	let cache = Arc::new(cache);

	c.bench_function("concurrent_reads_4_threads", |b| {
		b.iter(|| {
			let mut handles = vec![];

			for _ in 0..4 {
				let cache = cache.clone();
				handles.push(thread::spawn(move || {
					for i in 0..250 {
						let _ = cache.get(&i);
					}
				}));
			}

			for handle in handles {
				handle.join().unwrap();
			}
		});
	});
}

fn bench_collection_cycle(c: &mut Criterion) {
	let mut group = c.benchmark_group("collect");

	for size in [100u64, 1000, 10000] {
		group.throughput(Throughput::Elements(size));
		group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
			b.iter(|| {
				let collector = Collector::new();
				let cache: WeakCache<u64, BenchValue> = WeakCache::builder().collector(&collector).build();
				for i in 0..size {
					// Dropped immediately: every entry is reclaimed by the cycle
					cache.set(i, bench_value()).unwrap();
				}
				black_box(collector.collect());
			});
		});
	}

	group.finish();
}

criterion_group!(
	benches,
	bench_set,
	bench_get_hit,
	bench_get_miss,
	bench_mixed_workload,
	bench_concurrent_reads,
	bench_collection_cycle
);
criterion_main!(benches);
