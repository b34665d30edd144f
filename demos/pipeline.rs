//! # Fetch → transform → persist → notify
//!
//! Demonstrates the combinators:
//! - `then` / `map` sequencing
//! - `then_all` fan-out with ordered results
//! - `inspect` side effects
//! - one `catch` covering the whole chain
//! - a continuation on the affinity thread
//!
//! ## Run
//! ```bash
//! cargo run --example pipeline
//! ```

use std::time::Duration;

use taskchain::{Task, TaskError, TaskResult};

fn fetch_ids() -> Task<Vec<u32>> {
    Task::new(|_ctx| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(vec![3, 1, 4, 1, 5])
    })
}

fn fetch_price(id: u32) -> Task<u32> {
    Task::new(move |_ctx| async move {
        // Later ids finish first; results still come back in request order.
        tokio::time::sleep(Duration::from_millis(u64::from(10 * (6 - id)))).await;
        Ok(id * 100)
    })
}

fn persist(total: u32) -> TaskResult<()> {
    if total > 10_000 {
        return Err(TaskError::fail("total over budget"));
    }
    println!("{:>6}[persist] stored total={total}", "");
    Ok(())
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let chain = fetch_ids()
        .then_all(|ids| Ok(ids.into_iter().map(fetch_price).collect()))
        .inspect(|prices| {
            println!("{:>6}[prices] {prices:?}", "");
            Ok(())
        })
        .map(|prices: Vec<u32>| prices.iter().sum::<u32>())
        .inspect(|total| persist(*total))
        .then_on_affinity(|total| {
            println!(
                "{:>6}[notify] total={total} on {:?}",
                "",
                std::thread::current().name()
            );
        })
        .catch(|err| eprintln!("{:>6}[error] {err}", ""));

    let total = chain.run().await?;
    println!("pipeline finished: {total}");

    // The continuation runs on the affinity thread after we already have the result.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let failing = Task::<u32>::failure(TaskError::fail("upstream offline"))
        .then(|v| Ok(Task::success(v + 1)))
        .catch(|err| eprintln!("{:>6}[error] recovered: {err}", ""));
    if let Err(e) = failing.run().await {
        println!("second pipeline failed as expected: {}", e.as_label());
    }
    Ok(())
}
