// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runs a tree of forking environments on the model kernel and reports how
//! each one ended.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use neuron_exo::{syscall::Sysno, ExitReason, Kernel, KernelConfig, Program};

#[derive(Debug, Parser)]
#[command(name = "forkdemo", about = "Copy-on-write fork on the model exokernel")]
struct Args {
    /// TOML file overriding the kernel configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of fork rounds; every environment forks in each round.
    #[arg(long, default_value_t = 3)]
    depth: u32,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = match args.config.as_deref().map(KernelConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            error!(target: "env", "{err}");
            return ExitCode::FAILURE;
        }
    };
    let mut kernel = match Kernel::new(config) {
        Ok(kernel) => kernel,
        Err(err) => {
            error!(target: "env", "{err}");
            return ExitCode::FAILURE;
        }
    };
    info!(target: "env", "{:?}", kernel.config());
    if let Err(err) = kernel.create_env(Some(Program::fork_tree(args.depth))) {
        error!(target: "env", "cannot create root environment: {err}");
        return ExitCode::FAILURE;
    }

    let summary = kernel.run();
    let mut failed = !summary.idle;
    for exit in kernel.exits() {
        match &exit.reason {
            ExitReason::Exited(code) => {
                println!("{}: exited {code}", exit.env);
                failed |= *code != 0;
            }
            ExitReason::Killed(why) => {
                println!("{}: killed: {why}", exit.env);
                failed = true;
            }
        }
    }
    let stats = kernel.stats();
    println!(
        "{} steps, {} envs, {} faults, {} frames allocated (peak {} in use)",
        summary.steps,
        stats.envs_created,
        stats.faults,
        stats.pool.allocated,
        stats.pool.peak
    );
    for sysno in Sysno::ALL {
        println!("  {:<26} {}", sysno.name(), stats.syscall_count(sysno));
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
