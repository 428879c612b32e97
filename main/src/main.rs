/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use clap::Subcommand;
use eyre::WrapErr as _;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use affinity_config::load_config;
use affinity_config::AffinityConfig;
use cpu_affinity::format_cpu_list;
use cpu_affinity::parse_cpu_list;
use cpu_affinity::CpuId;
use cpu_affinity::NativeAffinity;
use cpu_affinity::OsAffinity;
use cpu_affinity::ProcessHandle;
use cpu_affinity::ScopedAffinity;

const PINNED_SPIN: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current processor and thread, process and system affinity.
    Show,
    /// Pin this thread to a cpu list for a moment and report where it ran.
    Pin {
        /// Cpu list like "0-3,6", defaults to pinning.thread-cpus, then every process cpu.
        #[arg(long)]
        cpus: Option<String>,
    },
    /// Change affinity of another process.
    SetProcess {
        #[arg(long)]
        pid: u32,
        #[arg(long)]
        cpus: String,
    },
    /// Restrict a process to its first cpus, or widen it to the whole system.
    Restrict {
        /// Defaults to this process.
        #[arg(long)]
        pid: Option<u32>,
        /// Defaults to pinning.process-cpu-limit, all system cpus if neither is set.
        #[arg(long)]
        count: Option<usize>,
    },
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config_path.as_deref())?;

    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .with_default_directive(Directive::from(config.logs.log_level))
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("setting global tracing subscriber failed")?;
    tracing_log::LogTracer::init()?;

    let os = OsAffinity;
    match args.command.unwrap_or(Command::Show) {
        Command::Show => show(&os),
        Command::Pin { cpus } => pin(&os, &config, cpus.as_deref()),
        Command::SetProcess { pid, cpus } => set_process(&os, pid, &cpus),
        Command::Restrict { pid, count } => restrict(&os, &config, pid, count),
    }
}

fn show(os: &OsAffinity) -> eyre::Result<()> {
    let current = cpu_affinity::current_processor_id(os)?;
    println!("processors:        {}", cpu_affinity::processor_count(os));
    println!("running on:        {current}");
    println!(
        "thread affinity:   {}",
        format_cpu_list(&cpu_affinity::current_thread_affinity(os)?)
    );
    println!(
        "process affinity:  {}",
        format_cpu_list(&cpu_affinity::current_process_affinity(os)?)
    );
    println!(
        "system affinity:   {}",
        format_cpu_list(&cpu_affinity::current_system_affinity(os)?)
    );

    Ok(())
}

fn pin(os: &OsAffinity, config: &AffinityConfig, cpus: Option<&str>) -> eyre::Result<()> {
    let cpus = pin_targets(os, &config.pinning.thread_cpus, cpus)?;

    let mut guard = ScopedAffinity::begin(os, cpus.iter().copied())
        .wrap_err_with(|| format!("pinning to cpus [{}] failed", format_cpu_list(&cpus)))?;
    tracing::info!(
        "pinned to cpus [{}], previous affinity [{}]",
        format_cpu_list(&cpus),
        format_cpu_list(&guard.previous_affinity())
    );

    let visited = spin_and_record_processors(os, PINNED_SPIN)?;
    println!("ran on cpus:       {}", format_cpu_list(&visited));

    guard.release()?;
    println!(
        "restored affinity: {}",
        format_cpu_list(&cpu_affinity::current_thread_affinity(os)?)
    );

    Ok(())
}

/// Cpus to pin to: the command line list, then the configured one, then every cpu
/// of the current process.
fn pin_targets<N: NativeAffinity>(
    native: &N,
    configured: &[CpuId],
    requested: Option<&str>,
) -> eyre::Result<Vec<CpuId>> {
    let cpus = match requested {
        Some(list) => parse_cpu_list(list)?,
        None => configured.to_vec(),
    };
    if !cpus.is_empty() {
        return Ok(cpus);
    }

    cpu_affinity::current_process_affinity(native)
        .wrap_err("reading process affinity for the default pin set failed")
}

fn set_process(os: &OsAffinity, pid: u32, cpus: &str) -> eyre::Result<()> {
    let cpus = parse_cpu_list(cpus)?;
    let process = ProcessHandle::open(os, pid)?;

    let before = cpu_affinity::process_affinity(os, &process)?;
    cpu_affinity::set_process_affinity(os, &process, cpus.iter().copied())?;
    let after = cpu_affinity::process_affinity(os, &process)?;

    tracing::info!(
        "process {pid} affinity changed from [{}] to [{}]",
        format_cpu_list(&before),
        format_cpu_list(&after)
    );
    println!("process {pid}: {}", format_cpu_list(&after));

    Ok(())
}

fn restrict(
    os: &OsAffinity,
    config: &AffinityConfig,
    pid: Option<u32>,
    count: Option<usize>,
) -> eyre::Result<()> {
    let process = match pid {
        Some(pid) => ProcessHandle::open(os, pid)?,
        None => ProcessHandle::current(os),
    };

    match count.or(config.pinning.process_cpu_limit) {
        Some(count) => {
            let applied = cpu_affinity::restrict_process_to(os, &process, count)?;
            tracing::info!("process restricted to [{}]", format_cpu_list(&applied));
        }
        None => {
            cpu_affinity::restrict_to_system_affinity(os, &process)?;
            tracing::info!("process widened to the system affinity");
        }
    }

    println!(
        "process affinity:  {}",
        format_cpu_list(&cpu_affinity::process_affinity(os, &process)?)
    );

    Ok(())
}

/// Busy-loops for `duration` and collects every processor the thread was seen on.
fn spin_and_record_processors(os: &OsAffinity, duration: Duration) -> eyre::Result<Vec<CpuId>> {
    let started = Instant::now();
    let mut visited = Vec::new();

    while started.elapsed() < duration {
        let cpu = cpu_affinity::current_processor_id(os)?;
        if !visited.contains(&cpu) {
            visited.push(cpu);
        }
        std::hint::spin_loop();
    }

    visited.sort_unstable();
    Ok(visited)
}
