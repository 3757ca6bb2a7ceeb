//! Interactive session.
//!
//! Reads one command per line from stdin while the tick scheduler streams a
//! live display of every timer to stderr. Transitions are printed to stdout
//! as one JSON event per line. Timers still open at exit keep their time
//! entries open and are restored by the next command or session.

use chrono::Duration;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use taskclock_core::timer::format_hms;
use taskclock_core::{
    Event, PersistenceGateway, TaskId, TimeTracker, TimerPhase, TimerSnapshot,
};

use super::{block_on, Context};

const HELP: &str = "commands: start <task> [minutes] | pause <task> | resume <task> | \
stop <task> | discard <task> | status | help | quit";

#[derive(Debug, PartialEq)]
enum SessionCommand {
    Start {
        task: TaskId,
        estimate: Option<Duration>,
    },
    Pause(TaskId),
    Resume(TaskId),
    Stop(TaskId),
    Discard(TaskId),
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
fn parse_line(line: &str) -> Result<Option<SessionCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let task = |words: &mut std::str::SplitWhitespace<'_>| {
        words
            .next()
            .map(TaskId::from)
            .ok_or_else(|| format!("'{verb}' needs a task id"))
    };

    let command = match verb {
        "start" => {
            let task = task(&mut words)?;
            let estimate = match words.next() {
                Some(raw) => {
                    let minutes: u32 = raw
                        .parse()
                        .map_err(|_| format!("invalid estimate '{raw}', expected minutes"))?;
                    Some(Duration::minutes(i64::from(minutes)))
                }
                None => None,
            };
            SessionCommand::Start { task, estimate }
        }
        "pause" => SessionCommand::Pause(task(&mut words)?),
        "resume" => SessionCommand::Resume(task(&mut words)?),
        "stop" => SessionCommand::Stop(task(&mut words)?),
        "discard" => SessionCommand::Discard(task(&mut words)?),
        "status" => SessionCommand::Status,
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

/// One display line per timer.
fn render(snapshot: &TimerSnapshot) -> String {
    let phase = match snapshot.phase {
        TimerPhase::Running => "running",
        TimerPhase::Paused => "paused",
    };
    match snapshot.remaining_secs {
        Some(secs) => format!(
            "{} {} {} (remaining {})",
            snapshot.task_id,
            snapshot.elapsed,
            phase,
            format_hms(Duration::seconds(secs as i64))
        ),
        None => format!("{} {} {}", snapshot.task_id, snapshot.elapsed, phase),
    }
}

fn print_event(event: &Event) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

fn print_outcome(task: &TaskId, event: Option<Event>) -> Result<(), Box<dyn Error>> {
    match event {
        Some(event) => print_event(&event),
        None => {
            eprintln!("{task}: no change");
            Ok(())
        }
    }
}

async fn execute<G: PersistenceGateway>(
    tracker: &TimeTracker<G>,
    command: SessionCommand,
) -> Result<(), Box<dyn Error>> {
    match command {
        SessionCommand::Start { task, estimate } => {
            let event = tracker.start(&task, estimate).await?;
            print_outcome(&task, event)
        }
        SessionCommand::Pause(task) => print_outcome(&task, tracker.pause(&task)),
        SessionCommand::Resume(task) => print_outcome(&task, tracker.resume(&task)),
        SessionCommand::Stop(task) => {
            let event = tracker.stop(&task).await?;
            print_outcome(&task, event)
        }
        SessionCommand::Discard(task) => print_outcome(&task, tracker.discard(&task)),
        SessionCommand::Status => {
            println!("{}", serde_json::to_string(&tracker.snapshots())?);
            Ok(())
        }
        SessionCommand::Help => {
            eprintln!("{HELP}");
            Ok(())
        }
        // Handled by the loop
        SessionCommand::Quit => Ok(()),
    }
}

async fn session(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let tracker = ctx.tracker().await?;
    for snapshot in tracker.snapshots() {
        eprintln!("restored {}", render(&snapshot));
    }

    let mut events = tracker.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(SessionCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = execute(&tracker, command).await {
                            eprintln!("error: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("error: {message}"),
                }
            }
            event = events.recv() => match event {
                Ok(Event::Tick { timers, .. }) => {
                    for snapshot in &timers {
                        eprintln!("{}", render(snapshot));
                    }
                }
                // Transitions are printed by the command that caused them.
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "display fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let open = tracker.snapshots().len();
    if open > 0 {
        eprintln!("{open} timer(s) left open; they will be restored next time");
    }
    tracker.scheduler().stop();
    Ok(())
}

pub fn run(ctx: &Context) -> Result<(), Box<dyn Error>> {
    block_on(session(ctx))?
}
