//! Load testing for the proxy.

use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_load_spreads_across_backends() {
    // 1. Setup mock backends that hold each request briefly
    let mut backends = Vec::new();
    for name in ["b1", "b2", "b3"] {
        let addr = common::start_programmable_backend(move || async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            (200, name.to_string())
        })
        .await;
        backends.push(addr);
    }

    // 2. Start proxy
    let (proxy, state, shutdown) = common::start_proxy(common::config_for(&backends, 1000)).await;

    // 3. Run load test
    let concurrency = 12;
    let requests_per_task = 10;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let start = Instant::now();

    let tasks: Vec<_> = (0..concurrency)
        .map(|_| {
            let client = client.clone();
            let url = format!("http://{proxy}/");
            tokio::spawn(async move {
                let mut served = Vec::new();
                for _ in 0..requests_per_task {
                    let res = client.get(&url).send().await.unwrap();
                    assert_eq!(res.status(), 200);
                    served.push(res.text().await.unwrap());
                }
                served
            })
        })
        .collect();

    let mut per_backend = std::collections::HashMap::<String, usize>::new();
    for task in tasks {
        for name in task.await.unwrap() {
            *per_backend.entry(name).or_default() += 1;
        }
    }

    let elapsed = start.elapsed();
    println!(
        "{} requests in {:?} ({:.0} req/s), distribution {:?}",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64(),
        per_backend
    );

    // 4. Every backend took a share and every counter settled back to zero
    assert_eq!(per_backend.values().sum::<usize>(), total_requests);
    assert_eq!(per_backend.len(), 3, "all backends should serve traffic");
    for status in state.balancer.snapshot() {
        assert_eq!(status.outstanding, 0, "{} still has requests in flight", status.id);
    }

    shutdown.trigger();
}
