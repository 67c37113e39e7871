//! Routing-table microbenchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use portmesh::{Address, RouteSet, Rtt, Via};

fn populated_set() -> RouteSet {
    let mut set = RouteSet::new();
    set.on_add_direct(Address::Background, Rtt(1));
    set.on_add_direct(Address::Content, Rtt(4));
    set.inc(Address::Popup, Via::Peer(Address::Background), Rtt(2));
    set.inc(Address::Popup, Via::Peer(Address::Content), Rtt(6));
    set.inc(Address::Native, Via::Peer(Address::Background), Rtt(3));
    set
}

fn bench_route_churn(c: &mut Criterion) {
    c.bench_function("route_set_inc_dec", |b| {
        b.iter(|| {
            let mut set = populated_set();
            for _ in 0..black_box(16) {
                black_box(set.inc(
                    Address::Injected,
                    Via::Peer(Address::Content),
                    Rtt(9),
                ));
                black_box(set.dec(Address::Injected, Via::Peer(Address::Content)));
            }
        })
    });
}

fn bench_rtt_updates(c: &mut Criterion) {
    c.bench_function("route_set_update_rtt", |b| {
        let mut set = populated_set();
        let mut rtt = 2u32;
        b.iter(|| {
            rtt = if rtt == 2 { 8 } else { 2 };
            black_box(set.update(
                Address::Popup,
                Via::Peer(Address::Background),
                Rtt(black_box(rtt)),
            ));
        })
    });
}

fn bench_forwarder_lookup(c: &mut Criterion) {
    c.bench_function("route_set_forwarder_for", |b| {
        let set = populated_set();
        b.iter(|| black_box(set.forwarder_for(black_box(Address::Popup), &[])))
    });
}

criterion_group!(
    benches,
    bench_route_churn,
    bench_rtt_updates,
    bench_forwarder_lookup
);
criterion_main!(benches);
