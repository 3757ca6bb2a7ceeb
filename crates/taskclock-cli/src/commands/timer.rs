use chrono::Duration;
use std::error::Error;

use taskclock_core::TaskId;

use super::{block_on, print_json, Context};

pub fn start(ctx: &Context, task: String, estimate: Option<u32>) -> Result<(), Box<dyn Error>> {
    block_on(start_task(ctx, TaskId::from(task), estimate))?
}

pub fn stop(ctx: &Context, task: String) -> Result<(), Box<dyn Error>> {
    block_on(stop_task(ctx, TaskId::from(task)))?
}

pub fn status(ctx: &Context) -> Result<(), Box<dyn Error>> {
    block_on(print_status(ctx))?
}

async fn start_task(
    ctx: &Context,
    task: TaskId,
    estimate: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let tracker = ctx.tracker().await?;
    let estimate = estimate.map(|minutes| Duration::minutes(i64::from(minutes)));

    match tracker.start(&task, estimate).await? {
        Some(event) => print_json(&event),
        // Already running or paused: show where it stands.
        None => print_json(&tracker.snapshot(&task)),
    }
}

async fn stop_task(ctx: &Context, task: TaskId) -> Result<(), Box<dyn Error>> {
    let tracker = ctx.tracker().await?;
    match tracker.stop(&task).await? {
        Some(event) => print_json(&event),
        None => Err(format!("no timer for task '{task}'").into()),
    }
}

async fn print_status(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let tracker = ctx.tracker().await?;
    print_json(&tracker.snapshots())
}
