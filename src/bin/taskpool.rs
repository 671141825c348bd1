//! taskpool CLI: run a scheduler against a demo processor.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use taskpool::config::Config;
use taskpool::telemetry::{TelemetryConfig, init_telemetry};
use taskpool::{Error, NewTask, Scheduler, SchedulerConfig, ShutdownPolicy, processor_fn};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "taskpool", about = "Bounded-concurrency task scheduler")]
struct Cli {
    /// TOML file with a [scheduler] table (overrides TASKPOOL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push a batch of tasks through a suffixing processor and report stats
    Run {
        /// Number of tasks to submit
        #[arg(long, default_value_t = 1000)]
        tasks: usize,
        /// Simulated processing time per task
        #[arg(long, default_value_t = 5)]
        delay_ms: u64,
        /// Worker count (0 = default)
        #[arg(long)]
        workers: Option<usize>,
        /// Queue capacity (0 = twice the worker count)
        #[arg(long)]
        queue_capacity: Option<usize>,
        /// Run every queued task before exiting
        #[arg(long)]
        drain: bool,
        /// Fail tasks whose input contains this string
        #[arg(long)]
        fail_on: Option<String>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            tasks,
            delay_ms,
            workers,
            queue_capacity,
            drain,
            fail_on,
        } => {
            let mut scheduler_config = config.scheduler;
            if let Some(w) = workers {
                scheduler_config.workers = w;
            }
            if let Some(c) = queue_capacity {
                scheduler_config.queue_capacity = c;
            }
            if drain {
                scheduler_config.shutdown = ShutdownPolicy::Drain;
            }
            cmd_run(&config, scheduler_config.normalized(), tasks, delay_ms, fail_on).await
        }
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_run(
    config: &Config,
    scheduler_config: SchedulerConfig,
    tasks: usize,
    delay_ms: u64,
    fail_on: Option<String>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(
        TelemetryConfig::new("taskpool")
            .endpoint(config.otel_endpoint.clone())
            .default_filter(&config.log_level),
    )?;

    let delay = Duration::from_millis(delay_ms);
    let processor = processor_fn(move |ctx, req| {
        let fail_on = fail_on.clone();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => anyhow::bail!("cancelled"),
            }
            let input = req.input.to_string();
            if fail_on.as_deref().is_some_and(|needle| input.contains(needle)) {
                anyhow::bail!("input rejected: {input}");
            }
            Ok(format!("{input}_done"))
        }
    });

    let scheduler = Scheduler::from_config(scheduler_config, processor);
    scheduler.start();

    let ctrl = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("interrupt received, stopping scheduler");
        ctrl.stop().await;
    });

    let started = Instant::now();
    let mut handles = Vec::with_capacity(tasks);
    let mut retries = 0u64;
    for i in 0..tasks {
        let new = NewTask::new("demo", format!("task-{i}")).user_id("cli");
        loop {
            match scheduler.submit_new(new.clone()) {
                Ok(handle) => {
                    handles.push(handle);
                    break;
                }
                Err(Error::QueueFull { .. }) => {
                    retries += 1;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => return Err(e).context("submit failed"),
            }
        }
    }

    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut lost = 0usize;
    for handle in handles {
        match handle.wait().await {
            Ok(result) if result.is_success() => ok += 1,
            Ok(_) => failed += 1,
            Err(_) => lost += 1,
        }
    }
    let elapsed = started.elapsed();

    scheduler.stop().await;
    let stats = scheduler.stats();

    info!(ok, failed, lost, retries, elapsed_ms = elapsed.as_millis() as u64, "run finished");
    println!("Tasks:      {tasks}");
    println!("Succeeded:  {ok}");
    println!("Failed:     {failed}");
    println!("Lost:       {lost}");
    println!("Retries:    {retries} (queue full)");
    println!("Elapsed:    {}ms", elapsed.as_millis());
    println!("---");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Workers:         {}", config.scheduler.workers);
    println!("Queue capacity:  {}", config.scheduler.queue_capacity);
    println!("Shutdown policy: {}", config.scheduler.shutdown);
    println!(
        "OTLP endpoint:   {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("Log level:       {}", config.log_level);
    Ok(())
}
