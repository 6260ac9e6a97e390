use criterion::{Criterion, criterion_group, criterion_main};
use netchar_core::{
    HostConfig, InMemoryMetrics, NodeNetChar, SegmentAlgorithm, Sessions, StaticTopology,
    Throughput,
};
use std::sync::Arc;

fn mbps(value: f64) -> Throughput {
    Throughput::from_mbps(value)
}

/// One domain, `zones` zones with one poa each, one edge server and
/// `terminals` wireless terminals per poa, one process per host.
fn scenario(zones: usize, terminals: usize) -> StaticTopology {
    let mut topo = StaticTopology::new(
        "bench",
        NodeNetChar::new(50.0, 5.0).with_throughput(mbps(1000.0), mbps(1000.0)),
    );
    topo.add_domain(
        "operator1",
        NodeNetChar::new(15.0, 3.0).with_throughput(mbps(1000.0), mbps(1000.0)),
    );
    for z in 0..zones {
        let zone = format!("zone{z}");
        let poa = format!("{zone}-poa");
        topo.add_zone(&zone, "operator1", NodeNetChar::new(5.0, 1.0));
        topo.add_poa(
            &poa,
            &zone,
            NodeNetChar::new(1.0, 1.0).with_throughput(mbps(100.0), mbps(100.0)),
        );
        let edge = format!("{zone}-edge");
        topo.add_host(HostConfig::new(&edge, NodeNetChar::default()).attached_to_zone(&zone));
        topo.add_process(&format!("{edge}-app"), &edge, NodeNetChar::default());
        for t in 0..terminals {
            let ue = format!("{zone}-ue{t}");
            topo.add_host(
                HostConfig::new(&ue, NodeNetChar::default())
                    .attached_to_poa(&poa)
                    .wireless(),
            );
            topo.add_process(&format!("{ue}-app"), &ue, NodeNetChar::default());
        }
    }
    topo
}

fn process_scenario(c: &mut Criterion) {
    let topo = scenario(4, 8);
    c.bench_function("process_scenario 4x8", |b| {
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut algo = SegmentAlgorithm::new(metrics);
        b.iter(|| {
            algo.process_scenario(&topo, &Sessions::default()).unwrap();
        })
    });
}

fn calculate_net_char(c: &mut Criterion) {
    let topo = scenario(4, 8);
    c.bench_function("calculate_net_char 4x8 idle", |b| {
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut algo = SegmentAlgorithm::new(Arc::clone(&metrics));
        algo.process_scenario(&topo, &Sessions::default()).unwrap();
        algo.calculate_net_char();
        b.iter(|| algo.calculate_net_char())
    });

    c.bench_function("calculate_net_char 4x8 active", |b| {
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut algo = SegmentAlgorithm::new(Arc::clone(&metrics));
        algo.process_scenario(&topo, &Sessions::default()).unwrap();
        algo.calculate_net_char();
        // every terminal streams from its zone's edge server; the
        // measurements drift so every pass reevaluates something
        let mut drift = 0.0;
        b.iter(|| {
            for z in 0..4 {
                for t in 0..8 {
                    metrics
                        .set_throughput(
                            &format!("zone{z}-edge-app"),
                            &format!("zone{z}-ue{t}-app"),
                            20.0 + drift,
                        )
                        .unwrap();
                }
            }
            drift = (drift + 7.0) % 60.0;
            algo.calculate_net_char()
        })
    });
}

criterion_group!(benches, process_scenario, calculate_net_char);
criterion_main!(benches);
