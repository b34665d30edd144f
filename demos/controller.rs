//! # Controller example
//!
//! Shows how the identity controller behaves:
//! - a new task for a busy identity supersedes the running one
//! - observers hear start, completion and cancellation
//! - progress is polled while a task runs
//!
//! ## Run
//! ```bash
//! cargo run --example controller --features "logging"
//! ```

use std::sync::Arc;
use std::time::Duration;

use taskchain::{
    Controller, ControllerConfig, LogWriter, Observe, ObserverId, Subscribe, Task, TaskContext,
    TaskHandle, TaskResult,
};

struct Screen {
    id: ObserverId,
}

impl Observe<String> for Screen {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn on_will_run(&self, task: &TaskHandle) {
        println!("{:>6}[screen] loading (task #{})", "", task.uid());
    }

    fn on_completed(&self, task: &TaskHandle, result: &TaskResult<String>) {
        println!("{:>6}[screen] task #{} -> {result:?}", "", task.uid());
    }

    fn on_cancelled(&self, task: &TaskHandle) {
        println!("{:>6}[screen] task #{} cancelled", "", task.uid());
    }
}

fn search(query: &'static str, duration_ms: u64) -> Task<String> {
    Task::new(move |ctx: TaskContext| async move {
        for step in 1..=4_u8 {
            ctx.publish_update(step * 25);
            tokio::time::sleep(Duration::from_millis(duration_ms / 4)).await;
        }
        Ok(format!("results for {query:?}"))
    })
    .with_id("search")
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let controller = Controller::<String>::builder(ControllerConfig {
        retain_finished: true,
        ..ControllerConfig::default()
    })
    .with_subscribers(subs)
    .build();
    let screen = Arc::new(Screen {
        id: ObserverId::next(),
    });
    controller.add_observer("search", &screen);

    // ============================================================
    // Demo -> Supersede: typing fast cancels the stale search
    // ============================================================
    println!("Demo 1: Supersede");
    controller.execute(search("ru", 400))?;
    tokio::time::sleep(Duration::from_millis(120)).await;
    println!(
        "{:>6}[poll] progress={:?}%",
        "",
        controller.pending_update_as::<u8>("search")
    );
    controller.execute(search("rust", 200))?;

    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("{:>6}[poll] finished={}", "", controller.did_finish("search"));

    // ============================================================
    // Demo -> Cancel: explicit cancellation evicts the entry
    // ============================================================
    println!("Demo 2: Cancel");
    controller.execute(search("tokio", 1_000))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.cancel_task("search");
    println!("{:>6}[poll] registered={:?}", "", controller.ids());

    // Let the log subscriber flush.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(())
}
