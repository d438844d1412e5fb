use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use onspring_bulk_core::fanout::fan_out;

#[tokio::test(start_paused = true)]
async fn never_exceeds_the_concurrency_ceiling() {
    let in_flight = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let results = fan_out((0..20).collect::<Vec<u64>>(), 3, |item| {
        let in_flight = &in_flight;
        let peak = &peak;
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10 + item % 4)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            item * 2
        }
    })
    .await;

    assert_eq!(results.len(), 20);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let mut sorted = results.clone();
    sorted.sort();
    assert_eq!(sorted, (0..20).map(|i| i * 2).collect::<Vec<u64>>());
}

#[tokio::test]
async fn zero_limit_still_runs_every_item() {
    let results = fan_out(vec![1, 2, 3], 0, |item| async move { item }).await;
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn failing_items_do_not_cancel_siblings() {
    let results: Vec<Result<i32, String>> = fan_out(vec![1, 2, 3, 4], 2, |item| async move {
        if item % 2 == 0 {
            Err(format!("item {item} failed"))
        } else {
            Ok(item)
        }
    })
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 2);
}
