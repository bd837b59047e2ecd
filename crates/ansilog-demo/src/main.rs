//! Worker threads sharing one terminal through partial lines.
//!
//! Runs a handful of fake build workers. Each keeps a progress indicator
//! alive at the bottom of the screen while completed steps scroll out
//! above. Pass `--multiline` to give every worker its own row instead of
//! the joined status line.
//!
//! ```text
//! cargo run -p ansilog-demo
//! cargo run -p ansilog-demo -- --multiline
//! ```

use std::thread;
use std::time::Duration;

use ansilog::{Flags, Logger, Sink};

const WORKERS: usize = 3;
const STEPS: usize = 24;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let multiline = std::env::args().any(|arg| arg == "--multiline");

    let status = Logger::new(Sink::stderr(), "@(dim:{isodate}) ", Flags::empty());
    if multiline {
        status.enable_multiline_mode();
    }
    status
        .println("@(bright,green:demo) starting workers")
        .unwrap();

    let handles: Vec<_> = (0..WORKERS)
        .map(|id| {
            thread::spawn(move || {
                let logger = Logger::new(
                    Sink::stderr(),
                    &format!("@(cyan:worker-{id}) "),
                    Flags::ELAPSED,
                );
                for step in 0..STEPS {
                    logger
                        .replace(format!("step {:2}/{STEPS} {}", step + 1, bar(step, STEPS)))
                        .unwrap();
                    thread::sleep(Duration::from_millis(60 + 35 * id as u64));
                    if step == STEPS / 2 {
                        logger
                            .println(format!("@(yellow:halfway) after {step} steps"))
                            .unwrap();
                    }
                }
                logger.println("@(green:done)").unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    status.println("@(bright,green:demo) all workers finished").unwrap();
    ansilog::flush_all();
}

fn bar(step: usize, total: usize) -> String {
    let filled = (step + 1) * 12 / total;
    let mut bar = String::with_capacity(14);
    bar.push('[');
    for i in 0..12 {
        bar.push(if i < filled { '#' } else { '.' });
    }
    bar.push(']');
    bar
}
