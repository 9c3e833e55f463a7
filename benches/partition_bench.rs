//! Benchmark for the partitioning pass
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use subgraph_delegate::partition::PartitionPlan;
use subgraph_delegate::prelude::*;

/// Chain of residual blocks; every block ends in an unsupported softmax
fn residual_chain(blocks: usize) -> Graph {
    let mut b = GraphBuilder::new();
    let mut x = b.variable("data").unwrap();

    for i in 0..blocks {
        let w = b.variable(&format!("w{}", i)).unwrap();
        let conv = b.op("Convolution", &format!("conv{}", i), &[x, w]).unwrap();
        let gamma = b.variable(&format!("gamma{}", i)).unwrap();
        let bn = b.op("BatchNorm", &format!("bn{}", i), &[conv, gamma]).unwrap();
        let relu = b.op("relu", &format!("relu{}", i), &[bn]).unwrap();
        let add = b.op("elemwise_add", &format!("add{}", i), &[relu, x]).unwrap();
        x = b.op("softmax", &format!("soft{}", i), &[add]).unwrap();
    }

    b.build(&[x]).unwrap()
}

fn partition_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let property = TensorrtProperty::new();

    for blocks in [8usize, 64, 256] {
        let graph = residual_chain(blocks);

        group.bench_with_input(BenchmarkId::new("plan", blocks), &graph, |b, graph| {
            b.iter(|| PartitionPlan::build(black_box(graph), &property).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("plan_apply", blocks), &graph, |b, graph| {
            b.iter(|| {
                let mut graph = graph.clone();
                partition_graph(
                    black_box(&mut graph),
                    &DelegationTarget::TensorRt,
                    &PartitionConfig::default(),
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, partition_benchmark);
criterion_main!(benches);
